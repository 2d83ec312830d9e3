//! html-play: Fetch a page and query it like a DOM
//!
//! Backends:
//! - browser: Render in headless Chrome (shared, lazily launched instance)
//! - direct: Plain HTTP request, no script execution
//!
//! Either way the result is a [`Response`] whose `dom` resolves links,
//! images and CSS background images against the page's base URL.

pub mod browser;
pub mod direct;
pub mod document;
pub mod element;
pub mod error;
pub mod fetch;
pub mod options;
pub mod resolve;
pub mod response;
pub mod session;

#[cfg(test)]
mod testing;

pub use browser::{
    BrowserHandle, BrowserOptions, ChromiumLauncher, LaunchOptions, Launcher, NavigationContext,
    NavigationHook, PageHandle,
};
pub use direct::{DirectOptions, FetchInit, Fetcher, RedirectMode, ReqwestFetcher};
pub use document::build_dom;
pub use element::{DocumentElement, ElementNode};
pub use error::{Error, Result};
pub use options::{normalize, Backend, FetchArgs, FetchOptions, RetrievalDescriptor, Toggle};
pub use resolve::resolve;
pub use response::{BackendKind, RawPage, Response};
pub use session::{fetch_html, global_session, Session};
