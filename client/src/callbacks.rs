use js_sys::{Function, Reflect};
use serde::Serialize;
use tracing::warn;
use wasm_bindgen::{JsCast, JsValue};

use worldmap_shared::{Callbacks, ConfigError};

const OVER: &str = "mapOver";
const OUT: &str = "mapOut";
const CLICK: &str = "mapClick";
const COORDS: &str = "mapCoords";
const DATE: &str = "mapDate";
const TABLE: &str = "mapTable";

/// Plain JS objects for every payload, never `Map`s.
pub fn to_js<T: Serialize + ?Sized>(value: &T) -> JsValue {
    match value.serialize(&serde_wasm_bindgen::Serializer::json_compatible()) {
        Ok(value) => value,
        Err(err) => {
            warn!(%err, "failed to convert payload");
            JsValue::UNDEFINED
        }
    }
}

/// Resolve one callback option: a function, or the name of a global function.
fn resolve(options: &JsValue, option: &str) -> Result<Option<Function>, ConfigError> {
    let not_callable = || ConfigError::NotCallable {
        option: option.to_string(),
    };
    let value = Reflect::get(options, &JsValue::from_str(option)).map_err(|_| not_callable())?;
    if value.is_undefined() || value.is_null() || value == JsValue::FALSE {
        return Ok(None);
    }
    if let Some(function) = value.dyn_ref::<Function>() {
        return Ok(Some(function.clone()));
    }
    let Some(name) = value.as_string() else {
        return Err(not_callable());
    };
    let global = web_sys::window().ok_or_else(not_callable)?;
    Reflect::get(&global, &JsValue::from_str(&name))
        .ok()
        .and_then(|value| value.dyn_into::<Function>().ok())
        .map(Some)
        .ok_or_else(not_callable)
}

fn report(option: &str, result: Result<JsValue, JsValue>) {
    if let Err(err) = result {
        warn!(option, ?err, "callback threw");
    }
}

/// Build the callback set from the JS option object.
pub fn from_options(options: &JsValue) -> Result<Callbacks, ConfigError> {
    let mut callbacks = Callbacks::default();
    if options.is_undefined() || options.is_null() {
        return Ok(callbacks);
    }

    if let Some(function) = resolve(options, OVER)? {
        callbacks = callbacks
            .on_over(move |node| report(OVER, function.call1(&JsValue::NULL, &to_js(node))));
    }
    if let Some(function) = resolve(options, OUT)? {
        callbacks = callbacks
            .on_out(move |node| report(OUT, function.call1(&JsValue::NULL, &to_js(node))));
    }
    if let Some(function) = resolve(options, CLICK)? {
        callbacks = callbacks.on_click(move |selection| {
            let payload = match selection {
                Some(node) => to_js(node),
                None => JsValue::from_str(""),
            };
            report(CLICK, function.call1(&JsValue::NULL, &payload));
        });
    }
    if let Some(function) = resolve(options, COORDS)? {
        callbacks = callbacks
            .on_coords(move |coords| report(COORDS, function.call1(&JsValue::NULL, &to_js(&coords))));
    }
    if let Some(function) = resolve(options, DATE)? {
        callbacks = callbacks.on_date(move |index, date| {
            let date = date.map_or(JsValue::UNDEFINED, JsValue::from_str);
            report(
                DATE,
                function.call2(&JsValue::NULL, &JsValue::from_f64(index as f64), &date),
            );
        });
    }
    if let Some(function) = resolve(options, TABLE)? {
        callbacks = callbacks
            .on_table(move |outcome| report(TABLE, function.call1(&JsValue::NULL, &to_js(outcome))));
    }
    Ok(callbacks)
}
