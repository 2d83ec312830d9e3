//! Direct HTTP retrieval (no rendering)

use crate::browser::DEFAULT_USER_AGENT;
use crate::error::Result;
use crate::response::RawPage;
use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::{Client, Method};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

/// Performs one HTTP request and returns final URL, status and body text.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url, init: &FetchInit) -> Result<RawPage>;
}

/// Whether the fetcher follows redirects or hands back the redirect response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedirectMode {
    #[default]
    Follow,
    Manual,
}

/// Request parameters for the direct backend.
#[derive(Debug, Clone)]
pub struct FetchInit {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub redirect: RedirectMode,
}

impl Default for FetchInit {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
            body: None,
            redirect: RedirectMode::Follow,
        }
    }
}

impl FetchInit {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Direct backend configuration.
#[derive(Clone, Default)]
pub struct DirectOptions {
    /// Request primitive; [`ReqwestFetcher`] when unset.
    pub fetcher: Option<Arc<dyn Fetcher>>,
    pub init: FetchInit,
}

impl DirectOptions {
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_init(mut self, init: FetchInit) -> Self {
        self.init = init;
        self
    }
}

impl fmt::Debug for DirectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectOptions")
            .field("fetcher", &self.fetcher.is_some())
            .field("init", &self.init)
            .finish()
    }
}

/// Default fetcher backed by reqwest.
///
/// Holds one client per redirect mode, built once, so connections are pooled
/// across requests. `Follow` uses reqwest's default policy (up to 10 hops);
/// the reported URL is the one the last hop landed on.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    follow: Client,
    manual: Client,
}

static DEFAULT_FETCHER: OnceCell<ReqwestFetcher> = OnceCell::const_new();

impl ReqwestFetcher {
    /// Fetcher sending the default browser-like user agent.
    pub fn new() -> Result<Self> {
        Self::with_user_agent(DEFAULT_USER_AGENT)
    }

    pub fn with_user_agent(user_agent: impl AsRef<str>) -> Result<Self> {
        let user_agent = user_agent.as_ref();
        let build = |policy: Policy| {
            Client::builder()
                .user_agent(user_agent)
                .redirect(policy)
                .build()
        };
        Ok(Self {
            follow: build(Policy::default())?,
            manual: build(Policy::none())?,
        })
    }

    fn client(&self, redirect: RedirectMode) -> &Client {
        match redirect {
            RedirectMode::Follow => &self.follow,
            RedirectMode::Manual => &self.manual,
        }
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &Url, init: &FetchInit) -> Result<RawPage> {
        let mut request = self
            .client(init.redirect)
            .request(init.method.clone(), url.clone());
        for (name, value) in &init.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &init.body {
            request = request.body(body.clone());
        }

        let response = request.send().await?;
        let final_url = response.url().to_string();
        let status = response.status().as_u16();
        let content = response.text().await?;

        Ok(RawPage {
            url: final_url,
            status,
            content,
        })
    }
}

pub(crate) async fn fetch(url: &Url, options: &DirectOptions) -> Result<RawPage> {
    debug!(url = %url, method = %options.init.method, "direct fetch");
    match &options.fetcher {
        Some(fetcher) => fetcher.fetch(url, &options.init).await,
        None => {
            let fetcher = DEFAULT_FETCHER
                .get_or_try_init(|| async { ReqwestFetcher::new() })
                .await?;
            fetcher.fetch(url, &options.init).await
        }
    }
}
