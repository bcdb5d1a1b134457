//! Browser lifecycle management on chromiumoxide
//!
//! Wraps a launched Chrome process and its CDP event handler task, and adapts
//! chromiumoxide pages to the [`PageSession`] seam.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
    FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, EventResponseReceived, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::{RwLock, RwLockReadGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{BrowserEngine, BrowserError, BrowserInstance, BrowserResult, PageSession, ResourceKind};
use crate::BrowserConfig;
use crate::browser_setup::{LaunchOptions, launch_browser};
use crate::fetch::LoadStrategy;

/// Profile directories must be unique per instance: the pool runs an old and a
/// new browser side by side while one retires.
static INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Launches Chrome/Chromium processes with the configured browser settings
#[derive(Debug, Clone)]
pub struct ChromeEngine {
    config: BrowserConfig,
}

impl ChromeEngine {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserEngine for ChromeEngine {
    async fn launch(&self) -> BrowserResult<Arc<dyn BrowserInstance>> {
        let seq = INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let user_data_dir = std::env::temp_dir().join(format!(
            "kodegen_page_scraper_{}_{}",
            std::process::id(),
            seq
        ));

        info!(instance = seq, "Launching browser instance");
        let (browser, handler) = launch_browser(LaunchOptions {
            headless: self.config.headless,
            disable_security: self.config.disable_security,
            user_data_dir: user_data_dir.clone(),
        })
        .await
        .map_err(|e| BrowserError::LaunchFailed(format!("{e:#}")))?;

        Ok(Arc::new(BrowserWrapper::new(browser, handler, user_data_dir)))
    }
}

/// A browser that can be closed while pages are being opened on it
///
/// Page opens share the slot and proceed concurrently; closing takes it
/// exclusively and waits for opens already in progress.
struct BrowserSlot<B> {
    inner: RwLock<Option<B>>,
}

impl<B> BrowserSlot<B> {
    fn new(browser: B) -> Self {
        Self {
            inner: RwLock::new(Some(browser)),
        }
    }

    async fn get(&self) -> BrowserResult<RwLockReadGuard<'_, B>> {
        RwLockReadGuard::try_map(self.inner.read().await, Option::as_ref)
            .map_err(|_| BrowserError::Closed)
    }

    async fn take(&self) -> Option<B> {
        self.inner.write().await.take()
    }
}

/// Wrapper for Browser and its event handler task
///
/// Ensures handler is properly cleaned up when browser is dropped.
/// Handler MUST be aborted to prevent it running indefinitely after
/// browser is closed.
pub struct BrowserWrapper {
    browser: BrowserSlot<Browser>,
    handler: JoinHandle<()>,
    user_data_dir: parking_lot::Mutex<Option<PathBuf>>,
}

impl BrowserWrapper {
    pub(crate) fn new(browser: Browser, handler: JoinHandle<()>, user_data_dir: PathBuf) -> Self {
        Self {
            browser: BrowserSlot::new(browser),
            handler,
            user_data_dir: parking_lot::Mutex::new(Some(user_data_dir)),
        }
    }

    /// Clean up temp directory (blocking operation)
    ///
    /// MUST be called AFTER `browser.wait()` completes to ensure Chrome
    /// has released all file handles. Windows will fail to remove locked files.
    fn cleanup_temp_dir(&self) {
        if let Some(path) = self.user_data_dir.lock().take() {
            info!("Cleaning up temp directory: {}", path.display());
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(
                    "Failed to clean up temp directory {}: {}. Manual cleanup may be required.",
                    path.display(),
                    e
                );
            }
        }
    }
}

#[async_trait]
impl BrowserInstance for BrowserWrapper {
    async fn new_page(&self) -> BrowserResult<Arc<dyn PageSession>> {
        let browser = self.browser.get().await?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::PageCreationFailed(e.to_string()))?;
        drop(browser);

        Ok(Arc::new(ChromePage::attach(page).await?))
    }

    /// Close and wait for the process to exit, then remove its profile.
    ///
    /// Calling `close()` on an already closed wrapper is a no-op.
    async fn close(&self) -> BrowserResult<()> {
        let Some(mut browser) = self.browser.take().await else {
            return Ok(());
        };

        if let Err(e) = browser.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
        if let Err(e) = browser.wait().await {
            warn!("Failed to wait for browser exit: {}", e);
        }
        drop(browser);

        self.cleanup_temp_dir();
        Ok(())
    }
}

impl Drop for BrowserWrapper {
    fn drop(&mut self) {
        debug!("Dropping BrowserWrapper - aborting handler task");
        self.handler.abort();

        if let Some(path) = self.user_data_dir.lock().as_ref() {
            warn!(
                "BrowserWrapper dropped without explicit close. \
                Temp directory will be orphaned: {}",
                path.display()
            );
        }
    }
}

impl From<&ResourceType> for ResourceKind {
    fn from(value: &ResourceType) -> Self {
        match value {
            ResourceType::Image => ResourceKind::Image,
            ResourceType::Stylesheet => ResourceKind::Stylesheet,
            ResourceType::Font => ResourceKind::Font,
            _ => ResourceKind::Other,
        }
    }
}

/// A chromiumoxide page plus the listener tasks bound to it
pub struct ChromePage {
    page: Page,
    has_response: Arc<AtomicBool>,
    listeners: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl ChromePage {
    /// Start observing network responses on `page`.
    ///
    /// The listener is registered before any navigation so the first response
    /// is never missed.
    pub async fn attach(page: Page) -> BrowserResult<Self> {
        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| BrowserError::PageCreationFailed(e.to_string()))?;

        let has_response = Arc::new(AtomicBool::new(false));
        let flag = has_response.clone();
        let watcher = tokio::spawn(async move {
            if responses.next().await.is_some() {
                flag.store(true, Ordering::Release);
            }
        });

        Ok(Self {
            page,
            has_response,
            listeners: parking_lot::Mutex::new(vec![watcher]),
        })
    }

    /// Navigate and wait for the load event plus lifecycle completion
    async fn goto_dynamic(&self, url: &str) -> BrowserResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    /// Navigate and return as soon as the DOM has been constructed
    ///
    /// Polls `document.readyState` with exponential backoff, starting at 50ms
    /// and capped at 500ms.
    async fn goto_static(&self, url: &str) -> BrowserResult<()> {
        let navigated = self
            .page
            .execute(NavigateParams::new(url))
            .await
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
        if let Some(error_text) = navigated.result.error_text.as_ref() {
            return Err(BrowserError::NavigationFailed(error_text.clone()));
        }

        let mut poll_interval = Duration::from_millis(50);
        let max_interval = Duration::from_millis(500);
        loop {
            let state = self.evaluate("document.readyState").await?;
            if matches!(state.as_str(), Some("interactive") | Some("complete")) {
                return Ok(());
            }
            tokio::time::sleep(poll_interval).await;
            poll_interval = (poll_interval * 2).min(max_interval);
        }
    }
}

#[async_trait]
impl PageSession for ChromePage {
    async fn block_resources(&self, kinds: &[ResourceKind]) -> BrowserResult<()> {
        let mut paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(|e| BrowserError::PageCreationFailed(e.to_string()))?;

        // No patterns: every request pauses at the request stage.
        self.page
            .execute(FetchEnableParams::default())
            .await
            .map_err(|e| BrowserError::PageCreationFailed(e.to_string()))?;

        let page = self.page.clone();
        let blocked = kinds.to_vec();
        let interceptor = tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let kind = ResourceKind::from(&event.resource_type);
                let outcome = if blocked.contains(&kind) {
                    page.execute(FailRequestParams::new(
                        event.request_id.clone(),
                        ErrorReason::BlockedByClient,
                    ))
                    .await
                    .map(|_| ())
                } else {
                    page.execute(ContinueRequestParams::new(event.request_id.clone()))
                        .await
                        .map(|_| ())
                };

                // Fails routinely once the page is closing
                if let Err(e) = outcome {
                    trace!(?kind, "Interception reply dropped: {}", e);
                }
            }
        });
        self.listeners.lock().push(interceptor);

        Ok(())
    }

    fn has_response(&self) -> bool {
        self.has_response.load(Ordering::Acquire)
    }

    async fn goto(
        &self,
        url: &str,
        strategy: LoadStrategy,
        timeout: Duration,
    ) -> BrowserResult<()> {
        let navigation = async {
            match strategy {
                LoadStrategy::DynamicWait => self.goto_dynamic(url).await,
                LoadStrategy::StaticWait => self.goto_static(url).await,
            }
        };

        tokio::time::timeout(timeout, navigation)
            .await
            .map_err(|_| {
                BrowserError::NavigationFailed(format!(
                    "{} navigation to {} did not settle within {}ms",
                    strategy,
                    url,
                    timeout.as_millis()
                ))
            })?
    }

    async fn content(&self) -> BrowserResult<String> {
        self.page
            .content()
            .await
            .map_err(|e| BrowserError::EvaluationFailed(e.to_string()))
    }

    async fn title(&self) -> BrowserResult<String> {
        let title = self
            .page
            .get_title()
            .await
            .map_err(|e| BrowserError::EvaluationFailed(e.to_string()))?;
        Ok(title.unwrap_or_default())
    }

    async fn evaluate(&self, script: &str) -> BrowserResult<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::EvaluationFailed(e.to_string()))?;

        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn close(&self) -> BrowserResult<()> {
        for listener in self.listeners.lock().drain(..) {
            listener.abort();
        }

        self.page
            .clone()
            .close()
            .await
            .map_err(|e| BrowserError::PageCreationFailed(e.to_string()))
    }
}

impl Drop for ChromePage {
    fn drop(&mut self) {
        for listener in self.listeners.get_mut().drain(..) {
            listener.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn page_opens_share_the_browser() {
        let slot = BrowserSlot::new("chrome".to_string());
        let first = slot.get().await.unwrap();

        let second = tokio::time::timeout(Duration::from_millis(50), slot.get())
            .await
            .expect("second open does not wait for the first")
            .unwrap();
        assert_eq!(*first, *second);
    }

    #[tokio::test]
    async fn close_waits_for_open_in_progress() {
        let slot = BrowserSlot::new("chrome".to_string());
        let opening = slot.get().await.unwrap();

        assert!(
            tokio::time::timeout(Duration::from_millis(20), slot.take())
                .await
                .is_err()
        );
        drop(opening);

        assert_eq!(slot.take().await.as_deref(), Some("chrome"));
        assert!(matches!(slot.get().await, Err(BrowserError::Closed)));
        assert_eq!(slot.take().await, None);
    }
}
