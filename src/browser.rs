//! Browser-rendered retrieval via headless Chrome (chromiumoxide)
//!
//! The backend talks to the browser through three small traits so sessions
//! can be driven by stand-ins in tests. [`ChromiumLauncher`] is the real
//! implementation.

use crate::error::{Error, Result};
use crate::response::RawPage;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, SetUserAgentOverrideParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, Stream};
use futures::{FutureExt, StreamExt};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// No request may be in flight, start or finish for this long before the page counts as idle.
const IDLE_WINDOW: Duration = Duration::from_millis(500);
const IDLE_POLL: Duration = Duration::from_millis(100);
const IDLE_CEILING: Duration = Duration::from_secs(30);

/// Starts a browser.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn BrowserHandle>>;
}

/// A running browser.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    async fn new_page(&self) -> Result<Arc<dyn PageHandle>>;
    fn is_connected(&self) -> bool;
    async fn close(&self) -> Result<()>;
}

/// One browser tab.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigate and wait until the network is idle. Returns the status of the
    /// main navigation response when the browser reports one.
    async fn goto(&self, url: &str) -> Result<Option<u16>>;
    async fn url(&self) -> Result<Option<String>>;
    /// Current rendered markup.
    async fn content(&self) -> Result<String>;
    async fn close(&self) -> Result<()>;
}

/// How to start Chrome when the session has to launch it.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub executable: Option<PathBuf>,
    /// Extra command-line switches.
    pub args: Vec<String>,
    pub sandbox: bool,
    pub user_agent: Option<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            args: Vec::new(),
            sandbox: false,
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
        }
    }
}

impl LaunchOptions {
    fn to_config(&self) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run");
        if !self.sandbox {
            builder = builder.no_sandbox().arg("--disable-setuid-sandbox");
        }
        if self.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        for arg in &self.args {
            builder = builder.arg(arg.clone());
        }
        builder
            .build()
            .map_err(|e| Error::InvalidOptions(format!("browser config: {}", e)))
    }
}

/// Handles passed to navigation hooks.
#[derive(Clone)]
pub struct NavigationContext {
    pub browser: Arc<dyn BrowserHandle>,
    pub page: Arc<dyn PageHandle>,
}

pub type NavigationHook =
    Arc<dyn Fn(NavigationContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Browser backend configuration.
///
/// An injected `browser` or `page` stays owned by the caller and is never
/// closed by a retrieval.
#[derive(Clone, Default)]
pub struct BrowserOptions {
    pub browser: Option<Arc<dyn BrowserHandle>>,
    pub page: Option<Arc<dyn PageHandle>>,
    pub launch_options: Option<LaunchOptions>,
    pub before_navigate: Option<NavigationHook>,
    pub after_navigate: Option<NavigationHook>,
}

impl BrowserOptions {
    pub fn with_browser(mut self, browser: Arc<dyn BrowserHandle>) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn with_page(mut self, page: Arc<dyn PageHandle>) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_launch_options(mut self, options: LaunchOptions) -> Self {
        self.launch_options = Some(options);
        self
    }

    pub fn before_navigate<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(NavigationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.before_navigate = Some(Arc::new(move |ctx| hook(ctx).boxed()));
        self
    }

    pub fn after_navigate<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(NavigationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.after_navigate = Some(Arc::new(move |ctx| hook(ctx).boxed()));
        self
    }
}

impl fmt::Debug for BrowserOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserOptions")
            .field("browser", &self.browser.is_some())
            .field("page", &self.page.is_some())
            .field("launch_options", &self.launch_options)
            .field("before_navigate", &self.before_navigate.is_some())
            .field("after_navigate", &self.after_navigate.is_some())
            .finish()
    }
}

/// Render `url` in `browser` and capture the final URL, status and markup.
///
/// Opens a page unless one was injected and closes only a page it opened,
/// on success and failure alike.
pub(crate) async fn render(
    url: &Url,
    browser: Arc<dyn BrowserHandle>,
    options: &BrowserOptions,
) -> Result<RawPage> {
    let (page, owns_page) = match &options.page {
        Some(page) => (Arc::clone(page), false),
        None => (browser.new_page().await?, true),
    };
    let context = NavigationContext {
        browser,
        page: Arc::clone(&page),
    };

    let captured = navigate_and_capture(url, &context, options).await;

    let released = if owns_page { page.close().await } else { Ok(()) };

    match (captured, released) {
        (Ok(raw), Ok(())) => Ok(raw),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!(url = %url, error = %close_err, "failed to close page after navigation error");
            Err(e)
        }
    }
}

async fn navigate_and_capture(
    url: &Url,
    context: &NavigationContext,
    options: &BrowserOptions,
) -> Result<RawPage> {
    if let Some(hook) = &options.before_navigate {
        hook(context.clone()).await?;
    }

    debug!(url = %url, "navigating");
    let status = context.page.goto(url.as_str()).await?;

    if let Some(hook) = &options.after_navigate {
        hook(context.clone()).await?;
    }

    let final_url = context
        .page
        .url()
        .await?
        .unwrap_or_else(|| url.to_string());
    let content = context.page.content().await?;

    Ok(RawPage {
        url: final_url,
        status: status.unwrap_or(0),
        content,
    })
}

/// Launches Chrome through chromiumoxide.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromiumLauncher;

#[async_trait]
impl Launcher for ChromiumLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn BrowserHandle>> {
        let config = options.to_config()?;
        debug!(headless = options.headless, "launching chrome");
        let (browser, mut handler) = Browser::launch(config).await?;

        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(Arc::new(ChromiumBrowser {
            browser: Mutex::new(browser),
            handler,
            user_agent: options.user_agent.clone(),
        }))
    }
}

struct ChromiumBrowser {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
    user_agent: Option<String>,
}

#[async_trait]
impl BrowserHandle for ChromiumBrowser {
    async fn new_page(&self) -> Result<Arc<dyn PageHandle>> {
        let page = self.browser.lock().await.new_page("about:blank").await?;
        if let Some(user_agent) = &self.user_agent {
            page.execute(SetUserAgentOverrideParams::new(user_agent.as_str()))
                .await?;
        }
        Ok(Arc::new(ChromiumPage { page }))
    }

    /// The handler stream ends when the DevTools connection goes away.
    fn is_connected(&self) -> bool {
        !self.handler.is_finished()
    }

    async fn close(&self) -> Result<()> {
        self.browser.lock().await.close().await?;
        self.handler.abort();
        Ok(())
    }
}

struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    /// Request lifecycle events for this page, merged into one stream.
    ///
    /// Subscribed before navigating so requests issued during load are seen.
    async fn network_activity(&self) -> Result<BoxStream<'static, NetworkActivity>> {
        let sent = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await?
            .map(|event| NetworkActivity::Started(event.request_id.inner().clone()));
        let finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await?
            .map(|event| NetworkActivity::Finished(event.request_id.inner().clone()));
        let failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await?
            .map(|event| NetworkActivity::Finished(event.request_id.inner().clone()));
        Ok(stream::select_all([sent.boxed(), finished.boxed(), failed.boxed()]).boxed())
    }
}

/// One request lifecycle event, keyed by CDP request id.
#[derive(Debug, Clone, PartialEq, Eq)]
enum NetworkActivity {
    Started(String),
    Finished(String),
}

/// In-flight requests and the time of the last request event.
#[derive(Debug)]
struct IdleTracker {
    in_flight: HashSet<String>,
    last_activity: Instant,
}

impl IdleTracker {
    fn new(now: Instant) -> Self {
        Self {
            in_flight: HashSet::new(),
            last_activity: now,
        }
    }

    /// Redirect hops reuse their request id, so a repeated start is one request.
    fn record(&mut self, activity: NetworkActivity, now: Instant) {
        match activity {
            NetworkActivity::Started(id) => {
                self.in_flight.insert(id);
            }
            NetworkActivity::Finished(id) => {
                self.in_flight.remove(&id);
            }
        }
        self.last_activity = now;
    }

    fn is_idle(&self, now: Instant, window: Duration) -> bool {
        self.in_flight.is_empty() && now.saturating_duration_since(self.last_activity) >= window
    }
}

/// Wait until no request is in flight and none has started or ended for
/// `window`. Returns `false` if that never happens within `ceiling`.
async fn wait_for_quiet<S>(activity: S, window: Duration, ceiling: Duration) -> bool
where
    S: Stream<Item = NetworkActivity> + Unpin,
{
    let mut activity = activity.fuse();
    let started = Instant::now();
    let mut tracker = IdleTracker::new(started);

    loop {
        let now = Instant::now();
        if tracker.is_idle(now, window) {
            return true;
        }
        if now.duration_since(started) >= ceiling {
            debug!(in_flight = tracker.in_flight.len(), "network never went idle");
            return false;
        }
        tokio::select! {
            Some(event) = activity.next() => tracker.record(event, Instant::now()),
            _ = tokio::time::sleep(IDLE_POLL) => {}
        }
    }
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn goto(&self, url: &str) -> Result<Option<u16>> {
        let activity = self.network_activity().await?;
        self.page.goto(url).await?;
        let request = self.page.wait_for_navigation_response().await?;
        let status = request
            .as_ref()
            .and_then(|request| request.response.as_ref())
            .and_then(|response| u16::try_from(response.status).ok());
        if !wait_for_quiet(activity, IDLE_WINDOW, IDLE_CEILING).await {
            return Err(navigation_error(
                url,
                format!(
                    "network did not become idle within {}s",
                    IDLE_CEILING.as_secs()
                ),
            ));
        }
        Ok(status)
    }

    async fn url(&self) -> Result<Option<String>> {
        Ok(self.page.url().await?)
    }

    async fn content(&self) -> Result<String> {
        Ok(self.page.content().await?)
    }

    async fn close(&self) -> Result<()> {
        self.page.clone().close().await?;
        Ok(())
    }
}

fn navigation_error(url: &str, err: impl fmt::Display) -> Error {
    Error::Navigation {
        url: url.to_string(),
        reason: err.to_string(),
    }
}
