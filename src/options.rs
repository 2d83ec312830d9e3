//! Normalize the accepted call shapes into one retrieval descriptor

use crate::browser::BrowserOptions;
use crate::direct::DirectOptions;
use crate::error::{Error, Result};
use crate::response::BackendKind;
use url::Url;

/// A backend flag: `false`, `true`, or `true` with configuration.
#[derive(Debug, Clone)]
pub enum Toggle<T> {
    Off,
    On,
    With(T),
}

impl<T> Toggle<T> {
    fn is_enabled(&self) -> bool {
        !matches!(self, Toggle::Off)
    }
}

impl<T> From<bool> for Toggle<T> {
    fn from(enabled: bool) -> Self {
        if enabled {
            Toggle::On
        } else {
            Toggle::Off
        }
    }
}

impl From<BrowserOptions> for Toggle<BrowserOptions> {
    fn from(options: BrowserOptions) -> Self {
        Toggle::With(options)
    }
}

impl From<DirectOptions> for Toggle<DirectOptions> {
    fn from(options: DirectOptions) -> Self {
        Toggle::With(options)
    }
}

/// Caller-facing options; `None` means the flag was not given.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub url: Option<String>,
    pub browser: Option<Toggle<BrowserOptions>>,
    pub fetch: Option<Toggle<DirectOptions>>,
}

impl FetchOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn browser(mut self, toggle: impl Into<Toggle<BrowserOptions>>) -> Self {
        self.browser = Some(toggle.into());
        self
    }

    pub fn fetch(mut self, toggle: impl Into<Toggle<DirectOptions>>) -> Self {
        self.fetch = Some(toggle.into());
        self
    }
}

/// The accepted argument shapes of a retrieval call.
#[derive(Debug, Clone)]
pub enum FetchArgs {
    Url(String),
    Options(FetchOptions),
    UrlWithOptions(String, FetchOptions),
}

impl From<&str> for FetchArgs {
    fn from(url: &str) -> Self {
        FetchArgs::Url(url.to_string())
    }
}

impl From<String> for FetchArgs {
    fn from(url: String) -> Self {
        FetchArgs::Url(url)
    }
}

impl From<FetchOptions> for FetchArgs {
    fn from(options: FetchOptions) -> Self {
        FetchArgs::Options(options)
    }
}

impl From<(&str, FetchOptions)> for FetchArgs {
    fn from((url, options): (&str, FetchOptions)) -> Self {
        FetchArgs::UrlWithOptions(url.to_string(), options)
    }
}

impl From<(String, FetchOptions)> for FetchArgs {
    fn from((url, options): (String, FetchOptions)) -> Self {
        FetchArgs::UrlWithOptions(url, options)
    }
}

/// The backend a descriptor selects, with its configuration.
#[derive(Debug, Clone)]
pub enum Backend {
    Browser(BrowserOptions),
    Direct(DirectOptions),
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Browser(_) => BackendKind::Browser,
            Backend::Direct(_) => BackendKind::Direct,
        }
    }
}

/// A validated retrieval request. Built only by [`normalize`].
#[derive(Debug, Clone)]
pub struct RetrievalDescriptor {
    url: Url,
    backend: Backend,
}

impl RetrievalDescriptor {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn into_parts(self) -> (Url, Backend) {
        (self.url, self.backend)
    }
}

/// Validate `args` and pick exactly one backend. Performs no I/O.
pub fn normalize(args: impl Into<FetchArgs>) -> Result<RetrievalDescriptor> {
    let options = match args.into() {
        FetchArgs::Url(url) => FetchOptions::new(url),
        FetchArgs::Options(options) => options,
        FetchArgs::UrlWithOptions(url, mut options) => {
            options.url.get_or_insert(url);
            options
        }
    };
    let FetchOptions {
        url,
        browser,
        fetch,
    } = options;

    let browser_on = browser.as_ref().is_some_and(Toggle::is_enabled);
    let fetch_on = fetch.as_ref().is_some_and(Toggle::is_enabled);
    if browser_on && fetch_on {
        return Err(Error::InvalidOptions(
            "do not select both the browser and fetch backends".to_string(),
        ));
    }
    if matches!(browser, Some(Toggle::Off)) && matches!(fetch, Some(Toggle::Off)) {
        return Err(Error::InvalidOptions(
            "browser and fetch are both disabled, no backend selected".to_string(),
        ));
    }

    let url = url.ok_or_else(|| Error::InvalidOptions("url is required".to_string()))?;
    let url = Url::parse(&url).map_err(|source| Error::InvalidUrl { url, source })?;

    let backend = match (browser, fetch) {
        (Some(Toggle::On), _) => Backend::Browser(BrowserOptions::default()),
        (Some(Toggle::With(options)), _) => Backend::Browser(options),
        (_, Some(Toggle::With(options))) => Backend::Direct(options),
        _ => Backend::Direct(DirectOptions::default()),
    };

    Ok(RetrievalDescriptor { url, backend })
}
