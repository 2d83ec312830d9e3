//! Relative reference resolution against a document's base URL

use url::Url;

/// Resolve `reference` against `base`.
///
/// Follows the WHATWG URL parser, so surrounding whitespace is ignored and an
/// empty reference resolves to the base itself (fragment removed). A reference
/// that cannot be resolved (for example against an opaque `about:blank` base)
/// is returned unchanged.
pub fn resolve(base: &Url, reference: &str) -> String {
    match base.join(reference) {
        Ok(url) => url.into(),
        Err(_) => reference.to_string(),
    }
}
