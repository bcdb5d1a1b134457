//! Browser engine seam and the chromiumoxide implementation behind it
//!
//! The rest of the crate only talks to the engine through [`BrowserEngine`],
//! [`BrowserInstance`] and [`PageSession`], so the pool and fetch logic can run
//! against a scripted engine in tests.

mod wrapper;

pub use crate::browser_setup::{download_managed_browser, find_browser_executable};
pub use wrapper::{BrowserWrapper, ChromeEngine, ChromePage};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fetch::LoadStrategy;

/// Network resource classes the interception policy can act on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Image,
    Stylesheet,
    Font,
    Other,
}

impl ResourceKind {
    /// Resource classes aborted before dispatch by default. They dominate load
    /// time and carry nothing the extractor reads.
    pub const BLOCKED_BY_DEFAULT: [ResourceKind; 3] =
        [ResourceKind::Image, ResourceKind::Stylesheet, ResourceKind::Font];
}

/// Launches live browser instances
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn launch(&self) -> BrowserResult<Arc<dyn BrowserInstance>>;
}

/// One live browser process
#[async_trait]
pub trait BrowserInstance: Send + Sync {
    /// Open a fresh page context
    async fn new_page(&self) -> BrowserResult<Arc<dyn PageSession>>;

    /// Close the process and release its resources
    async fn close(&self) -> BrowserResult<()>;
}

/// One rendered page inside a browser instance
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Abort requests of the given kinds before dispatch; let everything else through
    async fn block_resources(&self, kinds: &[ResourceKind]) -> BrowserResult<()>;

    /// Whether at least one network response has been observed on this page
    fn has_response(&self) -> bool;

    /// Navigate and wait until `strategy` considers the page settled, bounded by `timeout`
    async fn goto(&self, url: &str, strategy: LoadStrategy, timeout: Duration)
    -> BrowserResult<()>;

    /// Fully serialized rendered document
    async fn content(&self) -> BrowserResult<String>;

    async fn title(&self) -> BrowserResult<String>;

    /// Evaluate a self-contained script and return its JSON value
    async fn evaluate(&self, script: &str) -> BrowserResult<serde_json::Value>;

    async fn close(&self) -> BrowserResult<()>;
}

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Failed to create page: {0}")]
    PageCreationFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Script evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("Browser or page already closed")]
    Closed,

    /// The engine answered, but not with the shape the caller expected
    #[error("Unexpected value: {0}")]
    UnexpectedValue(String),
}

pub type BrowserResult<T> = Result<T, BrowserError>;
