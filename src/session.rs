//! Retrieval entry point and owner of the shared browser

use crate::browser::{self, BrowserHandle, BrowserOptions, ChromiumLauncher, LaunchOptions, Launcher};
use crate::direct;
use crate::error::{Error, Result};
use crate::options::{normalize, Backend, FetchArgs};
use crate::response::{BackendKind, RawPage, Response};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::sync::{Arc, LazyLock};
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

type LaunchResult = std::result::Result<Arc<dyn BrowserHandle>, Arc<Error>>;
type PendingBrowser = Shared<BoxFuture<'static, LaunchResult>>;

static GLOBAL: LazyLock<Session> = LazyLock::new(Session::new);

/// Fetch through the process-wide session.
///
/// ```no_run
/// # async fn demo() -> html_play::Result<()> {
/// let response = html_play::fetch_html("https://news.ycombinator.com").await?;
/// for title in response.dom.find_all(".titleline")? {
///     println!("{} {:?}", title.text(), title.link());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn fetch_html(args: impl Into<FetchArgs>) -> Result<Response> {
    GLOBAL.fetch(args).await
}

/// The session behind [`fetch_html`].
pub fn global_session() -> &'static Session {
    &GLOBAL
}

/// Dispatches retrievals and keeps one lazily launched browser for reuse.
///
/// The browser is launched on the first browser-backed call. Concurrent first
/// calls await the same launch. It stays open until [`Session::close`].
pub struct Session {
    launcher: Arc<dyn Launcher>,
    browser: Mutex<Option<PendingBrowser>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_launcher(Arc::new(ChromiumLauncher))
    }

    pub fn with_launcher(launcher: Arc<dyn Launcher>) -> Self {
        Self {
            launcher,
            browser: Mutex::new(None),
        }
    }

    pub async fn fetch(&self, args: impl Into<FetchArgs>) -> Result<Response> {
        let (url, backend) = normalize(args)?.into_parts();
        let kind = backend.kind();
        debug!(url = %url, backend = kind.as_str(), "fetch");

        let raw = match backend {
            Backend::Browser(options) => self.fetch_with_browser(&url, &options).await?,
            Backend::Direct(options) => direct::fetch(&url, &options).await?,
        };
        Ok(Response::from_raw(raw, kind))
    }

    async fn fetch_with_browser(
        &self,
        url: &Url,
        options: &BrowserOptions,
    ) -> Result<RawPage> {
        let handle = match &options.browser {
            Some(injected) => Arc::clone(injected),
            None => {
                let launch_options = options.launch_options.clone().unwrap_or_default();
                self.shared_browser(launch_options).await?
            }
        };
        browser::render(url, handle, options).await
    }

    /// The shared browser, launching it (or replacing a dead one) if needed.
    async fn shared_browser(&self, launch_options: LaunchOptions) -> Result<Arc<dyn BrowserHandle>> {
        let pending = {
            let mut slot = self.browser.lock().await;
            match slot.as_ref() {
                Some(pending) if reusable(pending) => pending.clone(),
                _ => {
                    debug!("installing shared browser launch");
                    let launcher = Arc::clone(&self.launcher);
                    let launch = async move { launcher.launch(&launch_options).await.map_err(Arc::new) }
                        .boxed()
                        .shared();
                    *slot = Some(launch.clone());
                    launch
                }
            }
        };
        pending.await.map_err(Error::Launch)
    }

    /// Close the shared browser, if one was launched. The next browser-backed
    /// call launches a new one.
    pub async fn close(&self) -> Result<()> {
        let pending = self.browser.lock().await.take();
        if let Some(pending) = pending {
            if let Ok(browser) = pending.await {
                browser.close().await?;
            }
        }
        Ok(())
    }
}

/// Pending launches and connected browsers are reused; failed launches and
/// disconnected browsers are replaced.
fn reusable(pending: &PendingBrowser) -> bool {
    match pending.peek() {
        None => true,
        Some(Ok(browser)) => browser.is_connected(),
        Some(Err(_)) => false,
    }
}
