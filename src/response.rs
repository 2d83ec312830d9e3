//! Caller-facing result of a retrieval

use crate::document::build_dom;
use crate::element::DocumentElement;
use serde_json::Value;

/// Which retrieval strategy produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Browser,
    Direct,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Browser => "browser",
            BackendKind::Direct => "direct",
        }
    }
}

/// What a backend hands back: final URL, status and body/markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    pub url: String,
    /// HTTP status of the main response, 0 when the backend has none.
    pub status: u16,
    pub content: String,
}

/// A retrieved page plus its parsed document.
#[derive(Debug)]
pub struct Response {
    pub url: String,
    pub status: u16,
    pub content: String,
    /// Present only when the content is valid JSON.
    pub json: Option<Value>,
    pub dom: DocumentElement,
    pub backend: BackendKind,
}

impl Response {
    pub(crate) fn from_raw(raw: RawPage, backend: BackendKind) -> Self {
        let RawPage {
            url,
            status,
            content,
        } = raw;
        let dom = build_dom(&content, &url);
        let json = match serde_json::from_str::<Value>(&content).ok() {
            Some(value) => Some(value),
            None if backend == BackendKind::Browser => viewer_json(&dom),
            None => None,
        };
        Self {
            url,
            status,
            content,
            json,
            dom,
            backend,
        }
    }
}

/// JSON shown through the browser's plain-text viewer: a body whose only
/// text is one `<pre>` block.
fn viewer_json(dom: &DocumentElement) -> Option<Value> {
    let body = dom.find("body").ok()??;
    let pre = body.find("body > pre").ok()??;
    let text = pre.raw_text();
    if body.raw_text().trim() != text.trim() {
        return None;
    }
    serde_json::from_str(&text).ok()
}
