//! fetch command: Retrieve one page and print what it contains
//!
//! Results go to stdout as JSON (default) or YAML; progress goes to stderr.

use crate::browser::{BrowserOptions, LaunchOptions};
use crate::direct::{DirectOptions, FetchInit, RedirectMode};
use crate::element::DocumentElement;
use crate::options::{FetchOptions, Toggle};
use crate::response::Response;
use crate::session::Session;
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct FetchCommand {
    /// URL to retrieve
    #[arg(required = true)]
    pub url: String,

    /// Render the page in headless Chrome before querying it
    #[arg(long)]
    pub browser: bool,

    /// Forbid the browser backend
    #[arg(long, conflicts_with = "browser")]
    pub no_browser: bool,

    /// Use the direct HTTP backend
    #[arg(long)]
    pub fetch: bool,

    /// CSS selector; prints one entry per matching element
    #[arg(long, short)]
    pub select: Option<String>,

    /// Keep only matches whose text contains this string
    #[arg(long, requires = "select")]
    pub containing: Option<String>,

    /// Output format: json (default) or yaml
    #[arg(long, short, default_value = "json")]
    pub format: String,

    /// Chrome/Chromium executable
    #[arg(long, env = "HTML_PLAY_CHROME")]
    pub chrome: Option<PathBuf>,

    /// Show the browser window instead of running headless
    #[arg(long)]
    pub headful: bool,

    /// Report redirect responses instead of following them (direct backend)
    #[arg(long)]
    pub no_redirect: bool,

    /// Max text length per element (0 = unlimited)
    #[arg(long, default_value = "2000")]
    pub max_chars: usize,
}

impl FetchCommand {
    fn options(&self) -> FetchOptions {
        let mut options = FetchOptions::new(self.url.clone());

        if self.browser {
            let launch = LaunchOptions {
                headless: !self.headful,
                executable: self.chrome.clone(),
                ..LaunchOptions::default()
            };
            options.browser = Some(Toggle::With(
                BrowserOptions::default().with_launch_options(launch),
            ));
        } else if self.no_browser {
            options.browser = Some(Toggle::Off);
        }

        if self.fetch || (self.no_redirect && !self.browser) {
            let redirect = if self.no_redirect {
                RedirectMode::Manual
            } else {
                RedirectMode::Follow
            };
            let init = FetchInit {
                redirect,
                ..FetchInit::default()
            };
            options.fetch = Some(Toggle::With(DirectOptions::default().with_init(init)));
        }

        options
    }
}

/// Compact page summary
#[derive(Debug, Serialize)]
pub struct PageSummary {
    pub url: String,
    pub status: u16,
    pub backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches: Option<Vec<ElementSummary>>,
    pub len: usize,
}

/// One selected element
#[derive(Debug, Serialize)]
pub struct ElementSummary {
    pub tag: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub background_image: String,
}

pub async fn run_fetch(args: FetchCommand) -> Result<()> {
    let backend = if args.browser { "browser" } else { "direct" };
    eprintln!("Fetching {} ({})...", truncate(&args.url, 60), backend);

    let session = Session::new();
    let fetched = session.fetch(args.options()).await;
    let summary = match fetched {
        Ok(response) => summarize(
            &response,
            args.select.as_deref(),
            args.containing.as_deref(),
            args.max_chars,
        ),
        Err(e) => Err(e.into()),
    };
    session.close().await?;
    let summary = summary?;

    let output = match args.format.as_str() {
        "yaml" | "yml" => serde_yaml::to_string(&summary)?,
        _ => serde_json::to_string_pretty(&summary)?,
    };
    println!("{}", output);
    eprintln!("Done: {} {}", summary.status, summary.url);

    Ok(())
}

fn summarize(
    response: &Response,
    select: Option<&str>,
    containing: Option<&str>,
    max_chars: usize,
) -> Result<PageSummary> {
    let dom = &response.dom;
    let title = dom
        .find("title")?
        .map(|title| title.text())
        .filter(|title| !title.is_empty());

    let (links, images, matches) = match select {
        Some(selector) => {
            let found = match containing {
                Some(text) => dom.find_all_containing(selector, text)?,
                None => dom.find_all(selector)?,
            };
            let matches = found
                .iter()
                .map(|element| describe(element, max_chars))
                .collect();
            (Vec::new(), Vec::new(), Some(matches))
        }
        None => (dom.links(), dom.images(), None),
    };

    Ok(PageSummary {
        url: response.url.clone(),
        status: response.status,
        backend: response.backend.as_str(),
        title,
        json: response.json.clone(),
        links,
        images,
        matches,
        len: response.content.len(),
    })
}

fn describe(element: &DocumentElement, max_chars: usize) -> ElementSummary {
    let text = element.text();
    let text = if max_chars > 0 {
        truncate(&text, max_chars)
    } else {
        text
    };
    ElementSummary {
        tag: element.tag_name().to_string(),
        text,
        link: element.link(),
        image: element.image(),
        background_image: element.background_image(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
