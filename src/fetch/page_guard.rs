//! Scoped ownership of one page context
//!
//! A page context must never outlive the request that opened it. Normal paths
//! call [`PageGuard::close`]; if the owning future is dropped mid-flight, `Drop`
//! hands the close to the runtime instead.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::browser::PageSession;
use crate::manager::BrowserHandle;
use crate::utils::{DetachedOperation, RaceOutcome, ScrapeError, ScrapeResult};

pub struct PageGuard {
    page: Arc<dyn PageSession>,
    browser_id: u64,
    closed: bool,
}

impl PageGuard {
    /// Open a new page context on `handle`
    pub async fn open(handle: &BrowserHandle) -> ScrapeResult<Self> {
        let page = handle.new_page().await.map_err(ScrapeError::Navigation)?;
        debug!(browser_id = handle.id(), "Opened page context");
        Ok(Self {
            page,
            browser_id: handle.id(),
            closed: false,
        })
    }

    pub fn page(&self) -> &Arc<dyn PageSession> {
        &self.page
    }

    /// Close the page, waiting at most `limit` for the engine to confirm
    pub async fn close(mut self, limit: Duration) {
        self.closed = true;
        let page = self.page.clone();
        let close = DetachedOperation::spawn("page_close", async move { page.close().await });

        match close.race(limit).await {
            RaceOutcome::Completed(Ok(())) => {
                debug!(browser_id = self.browser_id, "Closed page context");
            }
            RaceOutcome::Completed(Err(e)) => {
                debug!(browser_id = self.browser_id, "Page close failed: {}", e);
            }
            RaceOutcome::TimedOut | RaceOutcome::Failed(_) => {
                warn!(
                    browser_id = self.browser_id,
                    "Page close did not complete, leaving it to the engine"
                );
            }
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        let page = self.page.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let _ = page.close().await;
                });
            }
            Err(_) => warn!(
                browser_id = self.browser_id,
                "PageGuard dropped outside a runtime; page left open"
            ),
        }
    }
}
