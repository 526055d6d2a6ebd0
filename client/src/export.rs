use js_sys::{Array, Promise};
use tracing::{debug, warn};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    Blob, BlobPropertyBag, CanvasRenderingContext2d, HtmlAnchorElement, HtmlCanvasElement,
    HtmlImageElement, Url,
};

const FILE_STEM: &str = "world-map";
const SVG_MIME: &str = "image/svg+xml;charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Svg,
    Png,
}

impl ExportFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "svg" => Some(Self::Svg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
        }
    }
}

fn svg_object_url(svg: &str) -> Result<String, JsValue> {
    let parts = Array::of1(&JsValue::from_str(svg));
    let options = BlobPropertyBag::new();
    options.set_type(SVG_MIME);
    let blob = Blob::new_with_str_sequence_and_options(&parts, &options)?;
    Url::create_object_url_with_blob(&blob)
}

fn click_download(href: &str, format: ExportFormat) -> Result<(), JsValue> {
    let document = web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| JsValue::from_str("no document"))?;
    let body = document
        .body()
        .ok_or_else(|| JsValue::from_str("no document body"))?;
    let anchor: HtmlAnchorElement = document.create_element("a")?.dyn_into()?;
    anchor.set_href(href);
    anchor.set_download(&format!("{FILE_STEM}.{}", format.extension()));
    anchor.style().set_property("display", "none")?;
    body.append_child(&anchor)?;
    anchor.click();
    body.remove_child(&anchor)?;
    Ok(())
}

/// Save the serialized map. PNG rasterizes at `size` through a canvas.
pub async fn download(svg: String, format: ExportFormat, size: Option<(u32, u32)>) {
    let result = match format {
        ExportFormat::Svg => download_svg(&svg),
        ExportFormat::Png => download_png(&svg, size).await,
    };
    match result {
        Ok(()) => debug!(?format, "map exported"),
        Err(err) => warn!(?format, ?err, "map export failed"),
    }
}

fn download_svg(svg: &str) -> Result<(), JsValue> {
    let url = svg_object_url(svg)?;
    let result = click_download(&url, ExportFormat::Svg);
    Url::revoke_object_url(&url)?;
    result
}

async fn download_png(svg: &str, size: Option<(u32, u32)>) -> Result<(), JsValue> {
    let (width, height) = size.ok_or_else(|| JsValue::from_str("map has no viewBox"))?;
    let document = web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| JsValue::from_str("no document"))?;
    let canvas: HtmlCanvasElement = document.create_element("canvas")?.dyn_into()?;
    canvas.set_width(width);
    canvas.set_height(height);
    let context: CanvasRenderingContext2d = canvas
        .get_context("2d")?
        .ok_or_else(|| JsValue::from_str("2d context unavailable"))?
        .dyn_into()?;

    let url = svg_object_url(svg)?;
    let image = HtmlImageElement::new()?;
    let loaded = Promise::new(&mut |resolve, reject| {
        image.set_onload(Some(&resolve));
        image.set_onerror(Some(&reject));
    });
    image.set_src(&url);
    let decoded = JsFuture::from(loaded).await;
    Url::revoke_object_url(&url)?;
    decoded?;

    context.draw_image_with_html_image_element_and_dw_and_dh(
        &image,
        0.0,
        0.0,
        f64::from(width),
        f64::from(height),
    )?;
    let data_url = canvas.to_data_url_with_type("image/png")?;
    click_download(&data_url, ExportFormat::Png)
}
