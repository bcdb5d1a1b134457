//! Timeout utilities for browser operations
//!
//! Browser-side work cannot be cancelled from here: when a timer wins a race the
//! underlying CDP call keeps running until the engine's own limits stop it.
//! [`DetachedOperation`] makes that lifetime explicit instead of leaving a
//! dropped future to do it implicitly.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::utils::errors::{ScrapeError, ScrapeResult};

/// Maximum timeout for navigation operations (5 minutes)
pub const MAX_NAVIGATION_TIMEOUT_MS: u64 = 300_000;

/// Maximum timeout for content retrieval (30 seconds)
pub const MAX_CONTENT_TIMEOUT_MS: u64 = 30_000;

/// Result of racing a detached operation against a timer
#[derive(Debug)]
pub enum RaceOutcome<T> {
    /// The operation finished first
    Completed(T),
    /// The timer fired first; the operation keeps running in the background
    TimedOut,
    /// The background task panicked or was aborted
    Failed(String),
}

/// A browser operation spawned onto the runtime so it can outlive its caller
pub struct DetachedOperation<T> {
    name: &'static str,
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> DetachedOperation<T> {
    /// Spawn `future` as a background task. It runs to completion whether or
    /// not anyone is still waiting for it.
    pub fn spawn<F>(name: &'static str, future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            name,
            handle: tokio::spawn(future),
        }
    }

    /// Wait for the operation for at most `limit`.
    ///
    /// On timeout the join handle is dropped, which detaches the task without
    /// cancelling it.
    pub async fn race(mut self, limit: Duration) -> RaceOutcome<T> {
        match tokio::time::timeout(limit, &mut self.handle).await {
            Ok(Ok(value)) => RaceOutcome::Completed(value),
            Ok(Err(e)) => RaceOutcome::Failed(e.to_string()),
            Err(_) => {
                debug!(
                    operation = self.name,
                    limit_ms = limit.as_millis() as u64,
                    "Timer won the race; operation continues detached"
                );
                RaceOutcome::TimedOut
            }
        }
    }
}

/// Validate a configured timeout against an upper bound
///
/// # Example
/// ```rust
/// use kodegen_page_scraper::utils::validate_timeout;
/// let timeout = validate_timeout("content_timeout_ms", 5_000, 30_000).unwrap();
/// assert_eq!(timeout.as_millis(), 5_000);
/// ```
pub fn validate_timeout(field: &str, ms: u64, max_ms: u64) -> ScrapeResult<Duration> {
    if ms == 0 {
        return Err(ScrapeError::Config(format!("{field} must be greater than 0")));
    }

    if ms > max_ms {
        return Err(ScrapeError::Config(format!(
            "{field} cannot exceed {max_ms}ms ({:.1} seconds). Received: {ms}ms",
            max_ms as f64 / 1000.0
        )));
    }

    Ok(Duration::from_millis(ms))
}
