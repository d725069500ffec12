//! Value presentation: mime bundle construction, structured-JSON
//! preservation, and the plain-text lookup helper.

use serde_json::Value;

use crate::engine::{FormattedValue, RawValue};
use crate::messages::DataBundle;

const HTML_MIME: &str = "text/html";
const PLAIN_MIME: &str = "text/plain";

/// Renders a raw value into a string for a target mime type.
///
/// Collaborator boundary: kernels plug in their own formatter;
/// [`HtmlRenderer`] is the stock fallback.
pub trait ValueRenderer {
    fn render(&self, value: &RawValue, mime_type: &str) -> String;
}

/// Minimal escaping `<pre>` renderer used when an event carries no formatted
/// values.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl ValueRenderer for HtmlRenderer {
    fn render(&self, value: &RawValue, _mime_type: &str) -> String {
        format!("<pre>{}</pre>", escape_html(&value.to_plain_text()))
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn is_json_mime(mime_type: &str) -> bool {
    mime_type == "application/json" || mime_type.ends_with("+json")
}

/// Build the mime bundle for a display-family event.
///
/// JSON mime entries are parsed into structured values so the front-end gets
/// real objects instead of escaped strings; a payload that fails to parse
/// stays as plain text rather than failing the request. An empty collection
/// synthesizes a single HTML entry from the raw value.
pub fn data_bundle(
    formatted: &[FormattedValue],
    value: &RawValue,
    renderer: &impl ValueRenderer,
) -> DataBundle {
    let mut data = DataBundle::new();
    if formatted.is_empty() {
        data.insert(
            HTML_MIME.to_string(),
            Value::String(renderer.render(value, HTML_MIME)),
        );
        return data;
    }
    for fv in formatted {
        let entry = if is_json_mime(&fv.mime_type) {
            serde_json::from_str(&fv.value).unwrap_or_else(|_| Value::String(fv.value.clone()))
        } else {
            Value::String(fv.value.clone())
        };
        data.insert(fv.mime_type.clone(), entry);
    }
    data
}

/// The plain-text entry of the collection, or `default` when absent.
pub fn plain_text_or(formatted: &[FormattedValue], default: &str) -> String {
    formatted
        .iter()
        .find(|fv| fv.mime_type == PLAIN_MIME)
        .map(|fv| fv.value.clone())
        .unwrap_or_else(|| default.to_string())
}
