use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use leptos::mount::mount_to;
use leptos::prelude::*;
use tracing::debug;
use wasm_bindgen::JsCast;
use web_sys::{Element, Event, HtmlElement, HtmlObjectElement, KeyboardEvent, MouseEvent};

use worldmap_shared::{Callbacks, PlaybackCommand, WorldMap};

use crate::bindings::{self, Bindings};
use crate::controls::{MapOverlay, Overlay};
use crate::dom::DomMirror;

/// One live map: the core widget, its DOM mirror and everything attached to
/// the page on its behalf.
pub struct Session {
    map: RefCell<WorldMap>,
    dom: RefCell<DomMirror>,
    callbacks: Callbacks,
    overlay: Overlay,
    container: HtmlElement,
    object: HtmlObjectElement,
    bindings: RefCell<Option<Bindings>>,
    mount: RefCell<Option<Box<dyn Any>>>,
}

impl Session {
    pub fn start(
        map: WorldMap,
        dom: DomMirror,
        callbacks: Callbacks,
        container: HtmlElement,
        object: HtmlObjectElement,
    ) -> Rc<Self> {
        let session = Rc::new(Self {
            map: RefCell::new(map),
            dom: RefCell::new(dom),
            callbacks,
            overlay: Overlay::default(),
            container,
            object,
            bindings: RefCell::new(None),
            mount: RefCell::new(None),
        });
        session.mount_overlay();
        let bound = bindings::bind(&session);
        *session.bindings.borrow_mut() = Some(bound);
        // Construction already painted and may have queued a date event.
        session.run(|_| ());
        session
    }

    /// Run a widget operation, mirror its document changes onto the page and
    /// then deliver its events. Handlers run after every borrow is released,
    /// so they may call back into the map.
    pub fn run<R>(&self, op: impl FnOnce(&mut WorldMap) -> R) -> R {
        let (result, events) = {
            let mut map = self.map.borrow_mut();
            let result = op(&mut map);
            let changes = map.take_changes();
            if !changes.is_empty() {
                self.dom.borrow_mut().replay(map.document(), changes);
            }
            self.overlay.sync(&map);
            (result, map.take_events())
        };
        for event in &events {
            self.callbacks.dispatch(event);
        }
        result
    }

    pub fn read<R>(&self, op: impl FnOnce(&WorldMap) -> R) -> R {
        op(&self.map.borrow())
    }

    fn mount_overlay(self: &Rc<Self>) {
        let (show_info, show_time) = self.read(|map| {
            (
                map.options().show_info_box,
                map.options().time_controls,
            )
        });
        if !show_info && !show_time {
            return;
        }
        let on_command: Rc<dyn Fn(PlaybackCommand)> = {
            let session = Rc::downgrade(self);
            Rc::new(move |command| {
                if let Some(session) = session.upgrade() {
                    session.control(command);
                }
            })
        };
        let overlay = self.overlay;
        let handle = mount_to(self.container.clone(), move || {
            view! {
                <MapOverlay
                    overlay=overlay
                    show_info=show_info
                    show_time=show_time
                    on_command=on_command
                />
            }
        });
        *self.mount.borrow_mut() = Some(Box::new(handle));
    }

    fn target_node(&self, event: &Event) -> Option<worldmap_shared::NodeId> {
        self.dom.borrow().node_of(event.target())
    }

    pub fn pointer_over(&self, event: &Event) {
        if let Some(node) = self.target_node(event) {
            self.run(|map| map.pointer_over(node));
        }
    }

    pub fn pointer_out(&self, event: &Event) {
        if let Some(node) = self.target_node(event) {
            self.run(|map| map.pointer_out(node));
        }
    }

    pub fn pointer_up(&self, event: &Event) {
        if let Some(node) = self.target_node(event) {
            self.run(|map| map.pointer_up(node));
        }
    }

    /// Info box placement and coordinate tracking.
    pub fn pointer_move(&self, event: &Event) {
        // The map lives in the object's document, so its events come from
        // another realm and `instanceof` checks would fail.
        let event: &MouseEvent = event.unchecked_ref();
        let (show_info, track_coords) = self.read(|map| {
            (
                map.options().show_info_box,
                map.options().track_coords,
            )
        });
        if show_info {
            let frame = self.object.get_bounding_client_rect();
            self.overlay.pointer.set((
                frame.left() + f64::from(event.client_x()),
                frame.top() + f64::from(event.client_y()),
            ));
        }
        if track_coords {
            let point = map_point(self.dom.borrow().root(), event);
            if let Some((x, y)) = point {
                self.run(|map| map.report_coordinates(x, y));
            }
        }
    }

    pub fn key(&self, event: &Event) {
        let Some(event) = event.dyn_ref::<KeyboardEvent>() else {
            return;
        };
        let typing = event
            .target()
            .and_then(|target| target.dyn_into::<HtmlElement>().ok())
            .is_some_and(|el| matches!(el.tag_name().as_str(), "INPUT" | "TEXTAREA"));
        if typing {
            return;
        }
        if let Some(command) = PlaybackCommand::from_key(&event.key()) {
            self.control(command);
        }
    }

    pub fn control(&self, command: PlaybackCommand) {
        self.run(|map| map.control(command));
    }

    pub fn tick(&self) {
        self.run(WorldMap::tick);
    }

    pub fn svg_root(&self) -> Element {
        self.dom.borrow().root().clone()
    }

    /// Drop every listener, the timer and the overlay. The map stays on the
    /// page as last painted.
    pub fn detach(&self) {
        let bindings = self.bindings.borrow_mut().take();
        drop(bindings);
        let mount = self.mount.borrow_mut().take();
        drop(mount);
        debug!("map session detached");
    }

    pub fn destroy(&self) {
        self.detach();
        self.container.remove();
    }
}

/// Pointer position in map (viewBox) units, through the inverse screen CTM.
fn map_point(root: &Element, event: &MouseEvent) -> Option<(f64, f64)> {
    let svg: &web_sys::SvgsvgElement = root.unchecked_ref();
    let point = svg.create_svg_point();
    point.set_x(event.client_x() as f32);
    point.set_y(event.client_y() as f32);
    let inverse = svg.get_screen_ctm()?.inverse().ok()?;
    let mapped = point.matrix_transform(&inverse);
    Some((f64::from(mapped.x()), f64::from(mapped.y())))
}
