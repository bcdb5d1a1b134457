//! Fetch controller
//!
//! Opens a page context on the active browser, blocks heavy resources, races
//! navigation and content retrieval against timers and reports what came back.
//! A thrown failure while reading content (or running the page queries) is
//! treated as browser death and reported to the pool, which swaps in a fresh
//! browser.
//!
//! Two entry points share this core:
//! - [`FetchController::fetch_url`] returns the raw rendered markup (serving path)
//! - [`FetchController::scrape`] navigates with the DynamicWait -> StaticWait
//!   fallback and runs the extraction pipeline (scraping path)

mod page_guard;
mod strategy;

pub use page_guard::PageGuard;
pub use strategy::LoadStrategy;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::FetchConfig;
use crate::browser::PageSession;
use crate::manager::{BrowserHandle, BrowserPool};
use crate::page_extractor::{PageRecord, extract_page_record};
use crate::utils::{DetachedOperation, RaceOutcome, ScrapeError, ScrapeResult};

/// Outcome of one fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult {
    pub url: String,
    /// Serialized rendered document; `None` when content retrieval timed out
    pub html: Option<String>,
    /// At least one network response was observed on the page context
    pub has_response: bool,
}

/// Which strategy a navigation ended on and whether it settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationReport {
    pub strategy: LoadStrategy,
    pub settled: bool,
}

/// Accept only absolute http(s) URLs
pub fn validate_url(url: &str) -> ScrapeResult<()> {
    let parsed = url::Url::parse(url).map_err(|e| ScrapeError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ScrapeError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{other}', expected http or https"),
        }),
    }
}

pub struct FetchController {
    pool: Arc<BrowserPool>,
    config: FetchConfig,
}

impl FetchController {
    pub fn new(pool: Arc<BrowserPool>, config: FetchConfig) -> Self {
        Self { pool, config }
    }

    /// Fetch `url` on the active browser with the configured load strategy
    pub async fn fetch_url(&self, url: &str) -> ScrapeResult<FetchResult> {
        validate_url(url)?;
        let handle = self.pool.current()?;
        self.fetch(&handle, url, self.config.load_strategy).await
    }

    /// Fetch `url` on `handle`
    ///
    /// Returns within navigation timeout + grace + content timeout (plus the
    /// bounded page close) even when the engine never answers.
    ///
    /// # Errors
    /// - `ScrapeError::Navigation` if the page context cannot be opened or prepared
    /// - `ScrapeError::EngineFatal` if reading content threw; the pool has been told
    pub async fn fetch(
        &self,
        handle: &BrowserHandle,
        url: &str,
        strategy: LoadStrategy,
    ) -> ScrapeResult<FetchResult> {
        let guard = PageGuard::open(handle).await?;
        let result = self.fetch_on_page(handle, guard.page(), url, strategy).await;
        guard.close(self.config.content_timeout()).await;
        result
    }

    async fn fetch_on_page(
        &self,
        handle: &BrowserHandle,
        page: &Arc<dyn PageSession>,
        url: &str,
        strategy: LoadStrategy,
    ) -> ScrapeResult<FetchResult> {
        page.block_resources(&self.config.blocked_resources)
            .await
            .map_err(ScrapeError::Navigation)?;

        let settled = self
            .race_navigation(page, url, strategy, self.config.navigation_timeout())
            .await;
        debug!(url, %strategy, settled, "Navigation finished, reading content");

        let html = self.read_content(handle, page, url).await?;

        Ok(FetchResult {
            url: url.to_string(),
            html,
            has_response: page.has_response(),
        })
    }

    /// Scrape `url` into a canonical page record
    ///
    /// Navigation degrades from DynamicWait to StaticWait; a navigation that
    /// never settles still yields whatever the page rendered so far. The
    /// extraction pipeline is bounded by the extraction timeout.
    ///
    /// # Errors
    /// - `ScrapeError::Navigation` if the page context cannot be opened or prepared
    /// - `ScrapeError::Extraction` if a whole query category failed; when the
    ///   engine threw, the browser has been reported to the pool
    /// - `ScrapeError::ContentRetrievalTimeout` if extraction did not finish in time
    pub async fn scrape(&self, url: &str) -> ScrapeResult<PageRecord> {
        validate_url(url)?;
        let handle = self.pool.current()?;
        let guard = PageGuard::open(&handle).await?;

        let result = async {
            let page = guard.page();
            page.block_resources(&self.config.blocked_resources)
                .await
                .map_err(ScrapeError::Navigation)?;

            let report = self.navigate_with_fallback(page, url).await;
            if !report.settled {
                warn!(url, strategy = %report.strategy, "Extracting from a page that never settled");
            }

            self.read_record(page, url).await
        }
        .await;

        if let Err(e) = &result
            && e.is_engine_failure()
        {
            error!(url, browser_id = handle.id(), "Page queries threw: {}", e);
            self.report_engine_failure(&handle).await;
        }

        guard.close(self.config.content_timeout()).await;
        result
    }

    /// Run the extraction pipeline within the extraction timeout
    async fn read_record(&self, page: &Arc<dyn PageSession>, url: &str) -> ScrapeResult<PageRecord> {
        let session = page.clone();
        let original_url = url.to_string();
        let extraction = DetachedOperation::spawn("extraction", async move {
            extract_page_record(session, &original_url).await
        });
        let limit = self.config.extraction_timeout();

        match extraction.race(limit).await {
            RaceOutcome::Completed(record) => record,
            RaceOutcome::TimedOut => {
                let degraded = ScrapeError::ContentRetrievalTimeout(limit);
                warn!(url, "{}", degraded);
                Err(degraded)
            }
            RaceOutcome::Failed(reason) => Err(ScrapeError::EngineFatal(reason)),
        }
    }

    /// Navigate with DynamicWait, falling back once to StaticWait
    pub async fn navigate_with_fallback(
        &self,
        page: &Arc<dyn PageSession>,
        url: &str,
    ) -> NavigationReport {
        let mut strategy = LoadStrategy::DynamicWait;

        loop {
            let bound = strategy.timeout(&self.config);
            if self.race_navigation(page, url, strategy, bound).await {
                return NavigationReport {
                    strategy,
                    settled: true,
                };
            }

            match strategy.next() {
                Some(next) => {
                    info!(url, from = %strategy, to = %next, "Page could not be loaded, retrying");
                    strategy = next;
                }
                None => {
                    return NavigationReport {
                        strategy,
                        settled: false,
                    };
                }
            }
        }
    }

    /// Race one navigation against `bound` plus the configured grace.
    ///
    /// A failed or timed-out navigation is not an error: partial content may
    /// already be present. Returns whether the navigation settled.
    async fn race_navigation(
        &self,
        page: &Arc<dyn PageSession>,
        url: &str,
        strategy: LoadStrategy,
        bound: Duration,
    ) -> bool {
        let target = url.to_string();
        let session = page.clone();
        let navigation = DetachedOperation::spawn("navigation", async move {
            session.goto(&target, strategy, bound).await
        });

        let limit = bound + self.config.navigation_grace();
        match navigation.race(limit).await {
            RaceOutcome::Completed(Ok(())) => true,
            RaceOutcome::Completed(Err(e)) => {
                debug!(url, %strategy, "Navigation did not settle: {}", e);
                false
            }
            RaceOutcome::TimedOut => {
                let degraded = ScrapeError::NavigationTimeout(limit);
                warn!(url, %strategy, "{}", degraded);
                false
            }
            RaceOutcome::Failed(reason) => {
                warn!(url, %strategy, "Navigation task failed: {}", reason);
                false
            }
        }
    }

    /// Read the rendered document within the content timeout
    ///
    /// `Ok(None)` on timeout. A thrown failure reports `handle` to the pool.
    async fn read_content(
        &self,
        handle: &BrowserHandle,
        page: &Arc<dyn PageSession>,
        url: &str,
    ) -> ScrapeResult<Option<String>> {
        let session = page.clone();
        let content = DetachedOperation::spawn("content", async move { session.content().await });
        let limit = self.config.content_timeout();

        let reason = match content.race(limit).await {
            RaceOutcome::Completed(Ok(html)) => return Ok(Some(html)),
            RaceOutcome::TimedOut => {
                let degraded = ScrapeError::ContentRetrievalTimeout(limit);
                warn!(url, "{}", degraded);
                return Ok(None);
            }
            RaceOutcome::Completed(Err(e)) => e.to_string(),
            RaceOutcome::Failed(reason) => reason,
        };

        error!(url, browser_id = handle.id(), "Content retrieval threw: {}", reason);
        self.report_engine_failure(handle).await;
        Err(ScrapeError::EngineFatal(reason))
    }

    async fn report_engine_failure(&self, handle: &BrowserHandle) {
        if let Err(e) = self.pool.report_fatal(handle).await {
            error!(browser_id = handle.id(), "Browser replacement failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_url_accepts_http_and_https() {
        assert!(validate_url("https://example.com").is_ok());
        assert!(validate_url("http://example.com/a?b=c").is_ok());
    }

    #[test]
    fn validate_url_rejects_other_input() {
        assert!(matches!(
            validate_url("ftp://example.com"),
            Err(ScrapeError::InvalidUrl { .. })
        ));
        assert!(matches!(
            validate_url("example.com"),
            Err(ScrapeError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn fetch_result_serializes_camel_case() {
        let result = FetchResult {
            url: "https://example.com".into(),
            html: None,
            has_response: true,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["hasResponse"], true);
        assert!(json["html"].is_null());
    }
}
