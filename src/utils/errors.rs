use std::time::Duration;

use thiserror::Error;

use crate::browser::BrowserError;

/// Errors produced by the fetch and extraction pipeline
///
/// Every variant collapses to one of three envelope status codes at the
/// serving boundary (see [`ScrapeError::status_code`]). The distinctions are
/// only logged.
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// The load strategy exceeded its bound. Degraded result, not fatal.
    #[error("Navigation did not settle within {}ms", .0.as_millis())]
    NavigationTimeout(Duration),

    /// Reading the rendered content exceeded its bound. Degraded result with empty html.
    #[error("Content retrieval timed out after {}ms", .0.as_millis())]
    ContentRetrievalTimeout(Duration),

    /// The engine threw while serializing content; the browser process is presumed dead.
    #[error("Browser engine failed while reading content: {0}")]
    EngineFatal(String),

    #[error("No browser instance has been launched")]
    PoolExhausted,

    #[error("Failed to launch browser: {0}")]
    Launch(#[source] BrowserError),

    #[error("Navigation failed: {0}")]
    Navigation(#[source] BrowserError),

    /// A whole query category failed, so the page handle is unusable.
    #[error("Failed to extract {category}: {source}")]
    Extraction {
        category: &'static str,
        #[source]
        source: BrowserError,
    },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ScrapeError {
    /// Envelope status reported to the caller for this failure.
    ///
    /// A dead engine behaves like "fetched but nothing came back" (404); every
    /// other failure is a failed request (400).
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            ScrapeError::EngineFatal(_) => 404,
            _ => 400,
        }
    }

    /// True when the engine itself threw, so the page handle (and likely its
    /// browser) is unusable. Unexpected answer shapes do not count.
    #[must_use]
    pub fn is_engine_failure(&self) -> bool {
        match self {
            ScrapeError::EngineFatal(_) => true,
            ScrapeError::Extraction { source, .. } => {
                !matches!(source, BrowserError::UnexpectedValue(_))
            }
            _ => false,
        }
    }
}

pub type ScrapeResult<T> = Result<T, ScrapeError>;
