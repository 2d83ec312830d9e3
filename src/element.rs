//! Query and extraction over one node of a parsed document
//!
//! A [`DocumentElement`] is a cheap handle: the parsed tree and the page/base
//! URLs are reference counted and shared by every element derived from the
//! same document. Queries return new handles into the same tree.

use crate::error::{Error, Result};
use crate::resolve::resolve;
use ego_tree::NodeId;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::fmt;
use std::rc::Rc;
use std::sync::LazyLock;
use url::Url;

static ANCHORS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static IMAGES: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img[src]").unwrap());

/// One `name: value` declaration. Quoted strings and `url(...)` are taken
/// whole, so a `;` or `)` inside them does not end the value.
static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)([-a-z]+)\s*:\s*((?:url\(\s*(?:"[^"]*"|'[^']*'|[^)"']*)\s*\)|"[^"]*"|'[^']*'|[^;"'])*)"#,
    )
    .unwrap()
});
static CSS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^)"']*?))\s*\)"#).unwrap()
});

/// The slice of a parser's element node that extraction relies on.
pub trait ElementNode {
    /// Lowercase local name (`a`, `img`, ...).
    fn tag_name(&self) -> &str;
    fn attribute(&self, name: &str) -> Option<&str>;
    /// All descendant text nodes, concatenated as-is.
    fn text_content(&self) -> String;
    fn outer_html(&self) -> String;
    fn inner_html(&self) -> String;
}

impl ElementNode for ElementRef<'_> {
    fn tag_name(&self) -> &str {
        self.value().name()
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.value().attr(name)
    }

    fn text_content(&self) -> String {
        self.text().collect()
    }

    fn outer_html(&self) -> String {
        self.html()
    }

    fn inner_html(&self) -> String {
        ElementRef::inner_html(self)
    }
}

/// Page URL and effective base URL of one parsed document.
#[derive(Debug)]
pub(crate) struct DocumentContext {
    pub(crate) page_url: String,
    pub(crate) base_url: Url,
}

/// A queryable handle onto one element of a parsed document.
#[derive(Clone)]
pub struct DocumentElement {
    document: Rc<Html>,
    node: NodeId,
    context: Rc<DocumentContext>,
}

impl DocumentElement {
    pub(crate) fn new(document: Rc<Html>, node: NodeId, context: Rc<DocumentContext>) -> Self {
        Self {
            document,
            node,
            context,
        }
    }

    fn element(&self) -> ElementRef<'_> {
        self.document
            .tree
            .get(self.node)
            .and_then(ElementRef::wrap)
            .unwrap_or_else(|| self.document.root_element())
    }

    fn derive(&self, element: ElementRef<'_>) -> Self {
        Self::new(
            Rc::clone(&self.document),
            element.id(),
            Rc::clone(&self.context),
        )
    }

    fn resolve(&self, reference: &str) -> String {
        resolve(&self.context.base_url, reference)
    }

    /// Descendants (never the element itself) matching `selector`, in document order.
    fn descendants<'a>(
        &'a self,
        selector: &'a Selector,
    ) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        let node = self.node;
        self.element().select(selector).filter(move |el| el.id() != node)
    }

    fn matching<'a>(
        &'a self,
        selector: &'a Selector,
        containing: Option<&'a str>,
    ) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        self.descendants(selector).filter(move |el| match containing {
            Some(needle) => el.text_content().contains(needle),
            None => true,
        })
    }

    /// First descendant matching `selector`, or `None`.
    pub fn find(&self, selector: &str) -> Result<Option<DocumentElement>> {
        self.find_impl(selector, None)
    }

    /// First descendant matching `selector` whose text contains `text`.
    pub fn find_containing(&self, selector: &str, text: &str) -> Result<Option<DocumentElement>> {
        self.find_impl(selector, Some(text))
    }

    /// Every descendant matching `selector`; empty when nothing matches.
    pub fn find_all(&self, selector: &str) -> Result<Vec<DocumentElement>> {
        self.find_all_impl(selector, None)
    }

    /// Every descendant matching `selector` whose text contains `text`.
    pub fn find_all_containing(&self, selector: &str, text: &str) -> Result<Vec<DocumentElement>> {
        self.find_all_impl(selector, Some(text))
    }

    fn find_impl(&self, selector: &str, containing: Option<&str>) -> Result<Option<Self>> {
        let selector = parse_selector(selector)?;
        let found = self.matching(&selector, containing).next();
        Ok(found.map(|el| self.derive(el)))
    }

    fn find_all_impl(&self, selector: &str, containing: Option<&str>) -> Result<Vec<Self>> {
        let selector = parse_selector(selector)?;
        let found = self
            .matching(&selector, containing)
            .map(|el| self.derive(el))
            .collect();
        Ok(found)
    }

    pub fn tag_name(&self) -> &str {
        self.element().value().name()
    }

    /// Attribute value; `None` when absent, `Some("")` when present but empty.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.element().value().attr(name)
    }

    /// Concatenated descendant text, unmodified.
    pub fn raw_text(&self) -> String {
        self.element().text_content()
    }

    /// Text with whitespace runs collapsed and ends trimmed.
    pub fn text(&self) -> String {
        collapse_whitespace(&self.raw_text())
    }

    /// Outer HTML of the element.
    pub fn html(&self) -> String {
        self.element().outer_html()
    }

    pub fn inner_html(&self) -> String {
        ElementNode::inner_html(&self.element())
    }

    /// Own href if this is an anchor, else the first descendant anchor's.
    pub fn link(&self) -> Option<String> {
        self.raw_link().map(|href| self.resolve(href))
    }

    /// Unresolved href backing [`link`](Self::link).
    pub fn raw_link(&self) -> Option<&str> {
        let element = self.element().value();
        if element.name() == "a" {
            if let Some(href) = element.attr("href") {
                return Some(href);
            }
        }
        self.descendants(&ANCHORS)
            .find_map(|anchor| anchor.value().attr("href"))
    }

    /// Resolved hrefs of all descendant anchors; excludes the element's own href.
    pub fn links(&self) -> Vec<String> {
        self.descendants(&ANCHORS)
            .filter_map(|anchor| anchor.value().attr("href"))
            .map(|href| self.resolve(href))
            .collect()
    }

    pub fn image(&self) -> Option<String> {
        if let Some(src) = self.own_image() {
            return Some(src);
        }
        self.descendant_sources().next().map(|src| self.resolve(src))
    }

    pub fn images(&self) -> Vec<String> {
        if let Some(src) = self.own_image() {
            return vec![src];
        }
        self.descendant_sources().map(|src| self.resolve(src)).collect()
    }

    fn own_image(&self) -> Option<String> {
        let element = self.element();
        if element.tag_name() != "img" {
            return None;
        }
        element
            .attribute("src")
            .filter(|src| !src.is_empty())
            .map(|src| self.resolve(src))
    }

    fn descendant_sources(&self) -> impl Iterator<Item = &str> + '_ {
        self.descendants(&IMAGES)
            .filter_map(|img| img.value().attr("src"))
            .filter(|src| !src.is_empty())
    }

    /// URL from the inline `background-image` (or `background`) style, resolved;
    /// empty string when the element has none.
    pub fn background_image(&self) -> String {
        let Some(style) = self.attr("style") else {
            return String::new();
        };
        match background_url(style) {
            Some(literal) => self.resolve(literal),
            None => String::new(),
        }
    }

    /// The URL this document was retrieved from.
    pub fn page_url(&self) -> &str {
        &self.context.page_url
    }

    /// The base every relative reference in this document resolves against.
    pub fn base_url(&self) -> &Url {
        &self.context.base_url
    }
}

impl fmt::Debug for DocumentElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentElement")
            .field("tag", &self.tag_name())
            .field("page_url", &self.context.page_url)
            .field("base_url", &self.context.base_url.as_str())
            .finish()
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| Error::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Collapse every run of two or more whitespace characters into one space, then trim.
pub(crate) fn collapse_whitespace(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut run = String::new();
    for ch in raw.chars() {
        if ch.is_whitespace() {
            run.push(ch);
            continue;
        }
        flush_whitespace(&mut out, &mut run);
        out.push(ch);
    }
    flush_whitespace(&mut out, &mut run);
    out.trim().to_string()
}

fn flush_whitespace(out: &mut String, run: &mut String) {
    if run.chars().nth(1).is_some() {
        out.push(' ');
    } else {
        out.push_str(run);
    }
    run.clear();
}

/// The literal inside `url(...)` of the last background declaration,
/// `background-image` taking precedence over the shorthand.
fn background_url(style: &str) -> Option<&str> {
    let mut image = None;
    let mut shorthand = None;
    for cap in DECLARATION.captures_iter(style) {
        let value = cap.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
        if cap[1].eq_ignore_ascii_case("background-image") {
            image = Some(value);
        } else if cap[1].eq_ignore_ascii_case("background") {
            shorthand = Some(value);
        }
    }
    let value = image.or(shorthand).filter(|v| !v.is_empty())?;
    let cap = CSS_URL.captures(value)?;
    let literal = cap.get(1).or_else(|| cap.get(2)).or_else(|| cap.get(3))?;
    Some(literal.as_str().trim())
}

#[cfg(test)]
mod tests {
    use crate::document::build_dom;
    use super::background_url;

    const PAGE: &str = "http://localhost:3000/tests/html/page";

    #[test]
    fn test_find_and_miss() {
        let dom = build_dom("<div><p>one</p><p>two</p></div>", PAGE);
        let p = dom.find("p").unwrap().unwrap();
        assert_eq!(p.text(), "one");
        assert!(dom.find("xxx").unwrap().is_none());
    }

    #[test]
    fn test_find_all_empty_is_vec() {
        let dom = build_dom("<div><p>one</p><p>two</p></div>", PAGE);
        assert_eq!(dom.find_all("p").unwrap().len(), 2);
        assert!(dom.find_all("xxx").unwrap().is_empty());
    }

    #[test]
    fn test_find_containing() {
        let dom = build_dom(
            "<ul><li>apple pie</li><li>banana bread</li><li>banana split</li></ul>",
            PAGE,
        );
        let first = dom.find_containing("li", "banana").unwrap().unwrap();
        assert_eq!(first.text(), "banana bread");
        let all = dom.find_all_containing("li", "banana").unwrap();
        let texts: Vec<_> = all.iter().map(|li| li.text()).collect();
        assert_eq!(texts, ["banana bread", "banana split"]);
        assert!(dom.find_containing("li", "cherry").unwrap().is_none());
    }

    #[test]
    fn test_find_excludes_self() {
        let dom = build_dom("<div id=outer><div id=inner>x</div></div>", PAGE);
        let outer = dom.find("#outer").unwrap().unwrap();
        let divs = outer.find_all("div").unwrap();
        assert_eq!(divs.len(), 1);
        assert_eq!(divs[0].attr("id"), Some("inner"));
    }

    #[test]
    fn test_find_is_document_order() {
        let dom = build_dom("<section><b>1</b><i><b>2</b></i></section><b>3</b>", PAGE);
        let texts: Vec<_> = dom.find_all("b").unwrap().iter().map(|b| b.text()).collect();
        assert_eq!(texts, ["1", "2", "3"]);
    }

    #[test]
    fn test_invalid_selector() {
        let dom = build_dom("<p>x</p>", PAGE);
        let err = dom.find("p[").unwrap_err();
        assert!(err.to_string().contains("invalid selector"));
        assert!(dom.find_all("!!").is_err());
    }

    #[test]
    fn test_text_and_raw_text() {
        let dom = build_dom("<p id=t>a   b\n  c</p>", PAGE);
        let p = dom.find("#t").unwrap().unwrap();
        assert_eq!(p.raw_text(), "a   b\n  c");
        assert_eq!(p.text(), "a b c");
    }

    #[test]
    fn test_text_keeps_single_whitespace() {
        let dom = build_dom("<p id=t>  a\tb\nc  </p>", PAGE);
        let p = dom.find("#t").unwrap().unwrap();
        assert_eq!(p.text(), "a\tb\nc");
    }

    #[test]
    fn test_collapse_is_idempotent() {
        for raw in ["a   b\n  c", "  x \t\t y  ", "plain", "", "\n\n"] {
            let once = super::collapse_whitespace(raw);
            assert_eq!(super::collapse_whitespace(&once), once);
        }
    }

    #[test]
    fn test_base_tag_example() {
        let dom = build_dom(
            r#"<base href="http://example.com/"><a href="link"></a><img src="image">"#,
            PAGE,
        );
        let anchor = dom.find("a").unwrap().unwrap();
        assert_eq!(anchor.link().as_deref(), Some("http://example.com/link"));
        assert_eq!(anchor.raw_link(), Some("link"));
        let img = dom.find("img").unwrap().unwrap();
        assert_eq!(img.image().as_deref(), Some("http://example.com/image"));
    }

    #[test]
    fn test_resolution_without_base_uses_page_url() {
        let dom = build_dom(r#"<a href="/en">en</a><img src="logo.svg">"#, PAGE);
        assert_eq!(dom.link().as_deref(), Some("http://localhost:3000/en"));
        assert_eq!(
            dom.image().as_deref(),
            Some("http://localhost:3000/tests/html/logo.svg")
        );
    }

    #[test]
    fn test_link_prefers_own_href() {
        let dom = build_dom(r#"<a id=outer href="/own"><a href="/child"></a></a>"#, PAGE);
        let outer = dom.find("#outer").unwrap().unwrap();
        assert_eq!(outer.link().as_deref(), Some("http://localhost:3000/own"));
    }

    #[test]
    fn test_link_falls_back_to_descendant() {
        let dom = build_dom(r#"<div><a>no href</a><a href="b">b</a></div>"#, PAGE);
        let div = dom.find("div").unwrap().unwrap();
        assert_eq!(div.link().as_deref(), Some("http://localhost:3000/tests/html/b"));
        let p = build_dom("<p>nothing</p>", PAGE).find("p").unwrap().unwrap();
        assert!(p.link().is_none());
    }

    #[test]
    fn test_links_are_descendant_only() {
        let dom = build_dom(
            r#"<nav><a href="/en">1</a><a href="https://nodejs.org/docs/">2</a></nav>"#,
            PAGE,
        );
        let nav = dom.find("nav").unwrap().unwrap();
        assert_eq!(
            nav.links(),
            ["http://localhost:3000/en", "https://nodejs.org/docs/"]
        );
        let anchor = dom.find("a").unwrap().unwrap();
        assert!(anchor.links().is_empty());
    }

    #[test]
    fn test_image_prefers_own_src() {
        let dom = build_dom(r#"<img id=me src="me.png">"#, PAGE);
        let img = dom.find("#me").unwrap().unwrap();
        assert_eq!(
            img.images(),
            ["http://localhost:3000/tests/html/me.png"]
        );
    }

    #[test]
    fn test_images_skip_missing_source() {
        let dom = build_dom(
            r#"<div><img><img src=""><img src="a.png"><img src="/b.png"></div>"#,
            PAGE,
        );
        assert_eq!(
            dom.images(),
            [
                "http://localhost:3000/tests/html/a.png",
                "http://localhost:3000/b.png"
            ]
        );
        assert_eq!(
            dom.image().as_deref(),
            Some("http://localhost:3000/tests/html/a.png")
        );
        let empty = dom.find("img").unwrap().unwrap();
        assert!(empty.image().is_none());
        assert!(empty.images().is_empty());
    }

    #[test]
    fn test_background_image() {
        let dom = build_dom(
            r#"<base href="http://example.com/">
               <div id=a style="background-image: url('background')"></div>
               <div id=b style="color: red; background: #fff url(&quot;/bg.png&quot;) no-repeat"></div>
               <div id=c style="color: red"></div>
               <div id=d></div>"#,
            PAGE,
        );
        let bg = |id: &str| dom.find(id).unwrap().unwrap().background_image();
        assert_eq!(bg("#a"), "http://example.com/background");
        assert_eq!(bg("#b"), "http://example.com/bg.png");
        assert_eq!(bg("#c"), "");
        assert_eq!(bg("#d"), "");
    }

    #[test]
    fn test_background_image_wins_over_shorthand() {
        let dom = build_dom(
            r#"<div style="background-image: url(one.png); background: url(two.png)"></div>"#,
            "http://example.com/",
        );
        let div = dom.find("div").unwrap().unwrap();
        assert_eq!(div.background_image(), "http://example.com/one.png");
    }

    #[test]
    fn test_background_url_with_semicolon_and_parens() {
        assert_eq!(
            background_url("background-image: url('data:image/png;base64,AAAA')"),
            Some("data:image/png;base64,AAAA")
        );
        assert_eq!(
            background_url("background-image: url(data:image/png;base64,AAAA); color: red"),
            Some("data:image/png;base64,AAAA")
        );
        assert_eq!(
            background_url("background-image: url('a(1).png')"),
            Some("a(1).png")
        );
        assert_eq!(
            background_url(r#"color: red; background: #fff url( "b;c.png" ) no-repeat"#),
            Some("b;c.png")
        );
        assert_eq!(background_url(r#"content: "x;background:url(y)""#), None);
        assert_eq!(background_url("background: none"), None);
    }

    #[test]
    fn test_data_uri_background_is_kept() {
        let dom = build_dom(
            r#"<div style="background-image: url('data:image/png;base64,AAAA')"></div>
               <span style="background: url('img/a(1).png') center"></span>"#,
            "http://example.com/page",
        );
        let div = dom.find("div").unwrap().unwrap();
        assert_eq!(div.background_image(), "data:image/png;base64,AAAA");
        let span = dom.find("span").unwrap().unwrap();
        assert_eq!(span.background_image(), "http://example.com/img/a(1).png");
    }

    #[test]
    fn test_attr_absent_vs_empty() {
        let dom = build_dom(
            r#"<input type=search required aria-controls="react-autowhatever-1" spellcheck="false">"#,
            PAGE,
        );
        let input = dom.find("input[type=search]").unwrap().unwrap();
        assert_eq!(input.attr("required"), Some(""));
        assert_eq!(input.attr("xxx"), None);
        assert_eq!(input.attr("aria-controls"), Some("react-autowhatever-1"));
        assert_eq!(input.attr("spellcheck"), Some("false"));
    }

    #[test]
    fn test_html() {
        let dom = build_dom("<h2>Download</h2>", PAGE);
        let h2 = dom.find("h2").unwrap().unwrap();
        assert_eq!(h2.html(), "<h2>Download</h2>");
        assert_eq!(h2.inner_html(), "Download");
        assert_eq!(h2.tag_name(), "h2");
    }

    #[test]
    fn test_derived_elements_share_context() {
        let dom = build_dom(r#"<base href="http://example.com/x/"><div><a href="y">y</a></div>"#, PAGE);
        let div = dom.find("div").unwrap().unwrap();
        let a = div.find("a").unwrap().unwrap();
        assert_eq!(a.base_url(), dom.base_url());
        assert_eq!(a.page_url(), PAGE);
        assert_eq!(a.link().as_deref(), Some("http://example.com/x/y"));
    }
}
