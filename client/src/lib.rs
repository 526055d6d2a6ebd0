mod bindings;
mod callbacks;
mod controls;
mod dom;
mod export;
mod logging;
mod session;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::rc::{Rc, Weak};

use js_sys::Promise;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, spawn_local};
use web_sys::{Document, Element, HtmlElement, HtmlObjectElement, Window};

use worldmap_shared::config::SMALL_SCREEN_WIDTH;
use worldmap_shared::{
    ColorMap, CountryData, LabelScope, MapError, MapOptions, NodeInfo, TableMode, TimeSeries,
    WorldMap,
};

use crate::callbacks::to_js;
use crate::dom::DomMirror;
use crate::export::ExportFormat;
use crate::session::Session;

const CONTAINER_ID: &str = "svg-world-map-container";
const OBJECT_ID: &str = "svg-world-map";
const CONTAINER_CSS: &str = "#svg-world-map-container { position: relative; } \
    #svg-world-map-container, #svg-world-map { width: 100%; height: 100%; }";

thread_local! {
    static ACTIVE_SESSION: RefCell<Option<Weak<Session>>> = const { RefCell::new(None) };
}

fn js_error(err: impl Display) -> JsValue {
    js_sys::Error::new(&err.to_string()).into()
}

/// `undefined`, `null` and `false` all mean "not provided".
fn optional<T: DeserializeOwned>(value: &JsValue) -> Result<Option<T>, JsValue> {
    if value.is_undefined() || value.is_null() || *value == JsValue::FALSE {
        return Ok(None);
    }
    serde_wasm_bindgen::from_value(value.clone())
        .map(Some)
        .map_err(JsValue::from)
}

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    logging::init();
}

/// Load the map asset and build a map over it. Resolves once the map is
/// interactive; rejects on invalid options or when the asset fails to load.
///
/// Calling this again replaces the previous map rather than ignoring the
/// call: the old handle is detached, the container is reused and the map
/// object is reloaded unless it is still unpainted and of the same variant.
#[wasm_bindgen(js_name = svgWorldMap)]
pub async fn svg_world_map(
    options: JsValue,
    country_data: JsValue,
    time_data: JsValue,
) -> Result<SvgWorldMap, JsValue> {
    let map_options: MapOptions = optional(&options)?.unwrap_or_default();
    let callbacks = callbacks::from_options(&options)
        .map_err(MapError::from)
        .map_err(js_error)?;
    let country_data: Option<CountryData> = optional(&country_data)?;
    let time_series: Option<TimeSeries> = optional(&time_data)?;

    let window = web_sys::window().ok_or_else(|| js_error("no window"))?;
    let document = window.document().ok_or_else(|| js_error("no document"))?;

    // Re-initialization replaces the previous map instead of stacking a
    // second one on the same container.
    let previous = ACTIVE_SESSION
        .with(|slot| slot.borrow_mut().take())
        .and_then(|weak| weak.upgrade());
    if let Some(previous) = &previous {
        previous.detach();
    }

    let url = map_options.map_url(is_small_screen(&window));
    let container = ensure_container(&document)?;
    let object = ensure_object(&document, &container, &url, previous.is_some())?;
    let root = loaded_root(&object, &url).await.map_err(js_error)?;

    let (map_document, dom) = DomMirror::snapshot(&root);
    let map = WorldMap::new(map_document, map_options, country_data, time_series)
        .map_err(js_error)?;
    info!(
        countries = map.atlas().countries.len(),
        url = %url,
        "world map ready"
    );
    let session = Session::start(map, dom, callbacks, container, object);
    ACTIVE_SESSION.with(|slot| *slot.borrow_mut() = Some(Rc::downgrade(&session)));
    Ok(SvgWorldMap { session })
}

fn is_small_screen(window: &Window) -> bool {
    window
        .screen()
        .and_then(|screen| screen.width())
        .is_ok_and(|width| f64::from(width) < SMALL_SCREEN_WIDTH)
}

fn ensure_container(document: &Document) -> Result<HtmlElement, JsValue> {
    if let Some(existing) = document.get_element_by_id(CONTAINER_ID) {
        return existing.dyn_into().map_err(|_| js_error("map container is not an HTML element"));
    }
    let body = document.body().ok_or_else(|| js_error("no document body"))?;
    let container: HtmlElement = document.create_element("div")?.dyn_into()?;
    container.set_id(CONTAINER_ID);
    body.prepend_with_node_1(&container)?;

    let style = document.create_element("style")?;
    style.set_text_content(Some(CONTAINER_CSS));
    if let Some(head) = document.head() {
        head.append_child(&style)?;
    }
    Ok(container)
}

/// Reuse a pristine map object already on the page; a map another session
/// has painted, or one of the wrong variant, is replaced.
fn ensure_object(
    document: &Document,
    container: &HtmlElement,
    url: &str,
    repainted: bool,
) -> Result<HtmlObjectElement, JsValue> {
    let existing = document
        .get_element_by_id(OBJECT_ID)
        .and_then(|el| el.dyn_into::<HtmlObjectElement>().ok());
    if let Some(existing) = existing {
        if !repainted && existing.get_attribute("data").as_deref() == Some(url) {
            return Ok(existing);
        }
        existing.remove();
    }
    let object: HtmlObjectElement = document.create_element("object")?.dyn_into()?;
    object.set_id(OBJECT_ID);
    object.set_type("image/svg+xml");
    object.set_data(url);
    container.prepend_with_node_1(&object)?;
    Ok(object)
}

fn svg_root(object: &HtmlObjectElement) -> Option<Element> {
    object
        .content_document()?
        .document_element()
        .filter(|root| root.local_name() == "svg")
}

async fn loaded_root(object: &HtmlObjectElement, url: &str) -> Result<Element, MapError> {
    if let Some(root) = svg_root(object) {
        return Ok(root);
    }
    let loaded = Promise::new(&mut |resolve, reject| {
        object.set_onload(Some(&resolve));
        object.set_onerror(Some(&reject));
    });
    let outcome = JsFuture::from(loaded).await;
    object.set_onload(None);
    object.set_onerror(None);
    if outcome.is_err() {
        return Err(MapError::AssetLoad(url.to_string()));
    }
    svg_root(object).ok_or_else(|| MapError::AssetLoad(format!("{url} is not an SVG document")))
}

#[derive(Serialize)]
struct CountryIndex<'a> {
    countries: Vec<NodeInfo>,
    /// `groupBy key -> value -> country codes`.
    groups: BTreeMap<&'a str, BTreeMap<&'a str, Vec<&'a str>>>,
}

/// Handle returned to JS.
#[wasm_bindgen]
pub struct SvgWorldMap {
    session: Rc<Session>,
}

#[wasm_bindgen]
impl SvgWorldMap {
    pub fn out(&self, id: &str) {
        self.session.run(|map| map.out(id));
    }

    pub fn over(&self, id: &str) {
        self.session.run(|map| map.over(id));
    }

    pub fn click(&self, id: &str) {
        self.session.run(|map| map.click(id));
    }

    /// Sticky fills: `{ "DE": "#FF0000", "FR-IDF": "#00FF00" }`.
    pub fn update(&self, colors: JsValue) -> Result<(), JsValue> {
        let colors: ColorMap = serde_wasm_bindgen::from_value(colors)?;
        self.session.run(|map| map.update(&colors));
        Ok(())
    }

    pub fn reset(&self) {
        self.session.run(WorldMap::reset);
    }

    /// Toggle `"all"` labels or only `"micro"` state labels.
    pub fn labels(&self, scope: &str) {
        let scope = match scope {
            "all" => LabelScope::All,
            "micro" => LabelScope::Micro,
            other => {
                debug!(scope = other, "unknown label scope");
                return;
            }
        };
        self.session.run(|map| map.toggle_labels(scope));
    }

    /// Save the map as `"svg"` or `"png"`.
    pub fn download(&self, format: &str) {
        let Some(format) = ExportFormat::parse(format) else {
            debug!(format, "unknown export format");
            return;
        };
        let (svg, size) = self
            .session
            .read(|map| (map.export_svg(), map.raster_size()));
        spawn_local(export::download(svg, format, size));
    }

    /// Last tracked pointer position in map units, if any.
    pub fn coords(&self) -> JsValue {
        self.session
            .read(WorldMap::coordinates)
            .map_or(JsValue::UNDEFINED, |coords| to_js(&coords))
    }

    /// Append SVG markup to the shapes layer.
    pub fn shape(&self, markup: &str) -> Result<(), JsValue> {
        self.session
            .run(|map| map.draw_shape(markup))
            .map(|_| ())
            .map_err(js_error)
    }

    pub fn date(&self, index: usize) {
        self.session.run(|map| map.date(index));
    }

    /// Read an HTML table. `mode` is `"inspect"` (default) or `"animate"`.
    pub fn table(&self, html: &str, mode: Option<String>) -> JsValue {
        let mode = match mode.as_deref() {
            Some("animate") => TableMode::Animate,
            _ => TableMode::Inspect,
        };
        let outcome = self.session.run(|map| map.ingest_table(html, mode));
        to_js(&outcome)
    }

    /// Every country on the map plus the country groups.
    pub fn countries(&self) -> JsValue {
        self.session.read(|map| {
            let atlas = map.atlas();
            let countries = atlas
                .countries
                .values()
                .filter_map(|key| NodeInfo::of(atlas, *key))
                .collect();
            let groups = atlas
                .country_groups
                .iter()
                .map(|(attribute, values)| {
                    let values = values
                        .iter()
                        .map(|(value, members)| {
                            (value.as_str(), members.keys().map(String::as_str).collect())
                        })
                        .collect();
                    (attribute.as_str(), values)
                })
                .collect();
            to_js(&CountryIndex { countries, groups })
        })
    }

    /// Detach every listener, timer and overlay and remove the map container.
    pub fn destroy(&self) {
        self.session.destroy();
        ACTIVE_SESSION.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot
                .as_ref()
                .is_some_and(|active| std::ptr::eq(active.as_ptr(), Rc::as_ptr(&self.session)))
            {
                *slot = None;
            }
        });
    }
}
