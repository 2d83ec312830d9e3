//! Build a queryable document from markup and the URL it came from

use crate::element::{DocumentContext, DocumentElement};
use crate::resolve::resolve;
use scraper::{Html, Selector};
use std::rc::Rc;
use std::sync::LazyLock;
use url::Url;

static BASE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("base[href]").unwrap());

/// Parse `content` and return its root element.
///
/// The effective base URL is fixed here, once: the first `<base href>`
/// resolved against `page_url`, otherwise `page_url` itself. A page URL that
/// does not parse is treated as `about:blank`, so relative references stay
/// unresolved.
pub fn build_dom(content: &str, page_url: &str) -> DocumentElement {
    let document = Html::parse_document(content);
    let page = Url::parse(page_url).unwrap_or_else(|_| about_blank());

    let base_url = document
        .select(&BASE)
        .next()
        .and_then(|base| base.value().attr("href"))
        .and_then(|href| Url::parse(&resolve(&page, href)).ok())
        .unwrap_or_else(|| page.clone());

    let root = document.root_element().id();
    let context = DocumentContext {
        page_url: page_url.to_string(),
        base_url,
    };
    DocumentElement::new(Rc::new(document), root, Rc::new(context))
}

fn about_blank() -> Url {
    Url::parse("about:blank").expect("about:blank is a valid URL")
}
