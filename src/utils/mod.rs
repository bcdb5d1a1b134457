// Shared utilities - no feature gating
pub mod constants;
pub mod errors;
mod timeout;

pub use errors::{ScrapeError, ScrapeResult};
pub use timeout::{
    DetachedOperation, MAX_CONTENT_TIMEOUT_MS, MAX_NAVIGATION_TIMEOUT_MS, RaceOutcome,
    validate_timeout,
};
