//! In-process stand-ins for the browser traits

use crate::browser::{BrowserHandle, LaunchOptions, Launcher, PageHandle};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What every page opened by a [`FakeBrowser`] does.
#[derive(Debug, Clone)]
pub struct PageScript {
    pub content: String,
    pub final_url: Option<String>,
    pub status: Option<u16>,
    pub report_url: bool,
    pub fail_navigation: bool,
}

pub struct FakePage {
    script: PageScript,
    visited: Mutex<Option<String>>,
    closed: Arc<AtomicUsize>,
    navigations: Arc<AtomicUsize>,
}

impl FakePage {
    pub fn new(content: &str, closed: Arc<AtomicUsize>) -> Arc<Self> {
        Arc::new(Self::scripted(
            PageScript {
                content: content.to_string(),
                final_url: None,
                status: Some(200),
                report_url: true,
                fail_navigation: false,
            },
            closed,
            Arc::new(AtomicUsize::new(0)),
        ))
    }

    fn scripted(script: PageScript, closed: Arc<AtomicUsize>, navigations: Arc<AtomicUsize>) -> Self {
        Self {
            script,
            visited: Mutex::new(None),
            closed,
            navigations,
        }
    }
}

#[async_trait]
impl PageHandle for FakePage {
    async fn goto(&self, url: &str) -> Result<Option<u16>> {
        self.navigations.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_navigation {
            return Err(Error::Navigation {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_REFUSED".to_string(),
            });
        }
        let landed = self.script.final_url.clone().unwrap_or_else(|| url.to_string());
        *self.visited.lock().unwrap() = Some(landed);
        Ok(self.script.status)
    }

    async fn url(&self) -> Result<Option<String>> {
        if !self.script.report_url {
            return Ok(None);
        }
        Ok(self.visited.lock().unwrap().clone())
    }

    async fn content(&self) -> Result<String> {
        Ok(self.script.content.clone())
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeBrowser {
    script: Mutex<PageScript>,
    connected: AtomicBool,
    pub pages_opened: Arc<AtomicUsize>,
    pub pages_closed: Arc<AtomicUsize>,
    pub navigations: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
}

impl FakeBrowser {
    pub fn new(content: &str) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(PageScript {
                content: content.to_string(),
                final_url: None,
                status: Some(200),
                report_url: true,
                fail_navigation: false,
            }),
            connected: AtomicBool::new(true),
            pages_opened: Arc::new(AtomicUsize::new(0)),
            pages_closed: Arc::new(AtomicUsize::new(0)),
            navigations: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn configure(&self, edit: impl FnOnce(&mut PageScript)) {
        edit(&mut self.script.lock().unwrap());
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl BrowserHandle for FakeBrowser {
    async fn new_page(&self) -> Result<Arc<dyn PageHandle>> {
        self.pages_opened.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap().clone();
        Ok(Arc::new(FakePage::scripted(
            script,
            Arc::clone(&self.pages_closed),
            Arc::clone(&self.navigations),
        )))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Counts launches; each launch yields a fresh [`FakeBrowser`] after `delay`.
pub struct CountingLauncher {
    pub launches: AtomicUsize,
    pub browsers: Mutex<Vec<Arc<FakeBrowser>>>,
    content: String,
    delay: Duration,
    fail: AtomicBool,
}

impl CountingLauncher {
    pub fn new(content: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            launches: AtomicUsize::new(0),
            browsers: Mutex::new(Vec::new()),
            content: content.to_string(),
            delay,
            fail: AtomicBool::new(false),
        })
    }

    pub fn fail_next(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn last_browser(&self) -> Arc<FakeBrowser> {
        self.browsers.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl Launcher for CountingLauncher {
    async fn launch(&self, _options: &LaunchOptions) -> Result<Arc<dyn BrowserHandle>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Navigation {
                url: "chrome://launch".to_string(),
                reason: "executable not found".to_string(),
            });
        }
        let browser = FakeBrowser::new(&self.content);
        self.browsers.lock().unwrap().push(Arc::clone(&browser));
        Ok(browser)
    }
}
