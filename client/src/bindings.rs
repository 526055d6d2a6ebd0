use std::rc::Rc;

use gloo_timers::callback::Interval;
use tracing::warn;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Event, EventTarget};

use worldmap_shared::playback::TICK_PERIOD_MS;

use crate::session::Session;

struct Listener {
    target: EventTarget,
    kind: &'static str,
    callback: Closure<dyn Fn(Event)>,
}

impl Listener {
    fn attach(
        session: &Rc<Session>,
        target: &EventTarget,
        kind: &'static str,
        handler: fn(&Session, &Event),
    ) -> Option<Self> {
        let session = Rc::downgrade(session);
        let callback = Closure::<dyn Fn(Event)>::new(move |event: Event| {
            if let Some(session) = session.upgrade() {
                handler(&session, &event);
            }
        });
        match target.add_event_listener_with_callback(kind, callback.as_ref().unchecked_ref()) {
            Ok(()) => Some(Self {
                target: target.clone(),
                kind,
                callback,
            }),
            Err(err) => {
                warn!(kind, ?err, "failed to attach listener");
                None
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.kind, self.callback.as_ref().unchecked_ref());
    }
}

/// Page hooks held by one session. Dropping this detaches all of them.
pub struct Bindings {
    _listeners: Vec<Listener>,
    _timer: Option<Interval>,
}

/// Delegated pointer listeners on the SVG root, plus keyboard and timer
/// hooks when time controls are on.
pub fn bind(session: &Rc<Session>) -> Bindings {
    let root: EventTarget = session.svg_root().into();
    let (track_pointer, time_controls) = session.read(|map| {
        let options = map.options();
        (
            options.show_info_box || options.track_coords,
            options.time_controls,
        )
    });

    let mut listeners = Vec::new();
    listeners.extend(Listener::attach(session, &root, "mouseover", Session::pointer_over));
    listeners.extend(Listener::attach(session, &root, "mouseout", Session::pointer_out));
    listeners.extend(Listener::attach(session, &root, "mouseup", Session::pointer_up));
    if track_pointer {
        listeners.extend(Listener::attach(session, &root, "mousemove", Session::pointer_move));
    }

    let mut timer = None;
    if time_controls {
        if let Some(document) = web_sys::window().and_then(|window| window.document()) {
            listeners.extend(Listener::attach(session, &document, "keyup", Session::key));
        }
        let session = Rc::downgrade(session);
        timer = Some(Interval::new(TICK_PERIOD_MS, move || {
            if let Some(session) = session.upgrade() {
                session.tick();
            }
        }));
    }

    Bindings {
        _listeners: listeners,
        _timer: timer,
    }
}
