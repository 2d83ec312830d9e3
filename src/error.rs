//! Error type shared by every retrieval and query operation

use std::sync::Arc;
use thiserror::Error;

/// Errors raised while normalizing options, retrieving a page, or querying it.
///
/// Validation variants are produced before any I/O happens. Transport,
/// browser and navigation variants carry the collaborator's failure as-is.
#[derive(Error, Debug)]
pub enum Error {
    /// Conflicting or missing backend selection, or a missing URL.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// The target URL is not an absolute URL.
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Network-level failure from the direct backend.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failure reported by the Chrome DevTools connection.
    #[error("browser error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    /// Navigation did not complete (or never went network-idle).
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// A before/after navigation hook returned an error.
    #[error("navigation hook failed: {0}")]
    Hook(String),

    /// The shared browser launch failed; every waiter observes the same error.
    #[error("shared browser launch failed: {0}")]
    Launch(#[source] Arc<Error>),

    /// A CSS selector passed to a query could not be parsed.
    #[error("invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
