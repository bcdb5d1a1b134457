//! Shared configuration constants for the page scraper
//!
//! Default values used throughout the codebase to avoid magic numbers.

/// Chrome user agent string sent by launched browsers
///
/// Chrome releases new stable versions ~every 4 weeks.
/// Update quarterly to stay within reasonable version window.
///
/// Reference: https://chromiumdash.appspot.com/schedule
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// Navigation bound for the serving fetch path (ms)
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 15_000;

/// Extra time the controller's timer allows beyond the navigation bound (ms)
pub const DEFAULT_NAVIGATION_GRACE_MS: u64 = 3_000;

/// Bound on serializing the rendered document (ms)
pub const DEFAULT_CONTENT_TIMEOUT_MS: u64 = 5_000;

/// Bound on the near-network-idle strategy used by the scraping path (ms)
/// Bound on the whole extraction pipeline of one page
pub const DEFAULT_EXTRACTION_TIMEOUT_MS: u64 = 10_000;

pub const DEFAULT_DYNAMIC_TIMEOUT_MS: u64 = 100_000;

/// Bound on the DOM-ready strategy used after the dynamic one fails (ms)
pub const DEFAULT_STATIC_TIMEOUT_MS: u64 = 50_000;

/// Grace period before a retiring browser is closed (ms)
pub const DEFAULT_RETIRE_GRACE_MS: u64 = 30_000;

/// Usage text served on `GET /`
pub const WELCOME_MESSAGE: &str = "Welcome to the page scraper! Please make a POST request to /crawler with a JSON body \
containing a \"url\" property. Example: curl -d '{\"url\":\"https://google.com\"}' -H \"Content-Type: \
application/json\" -X POST [Server URL]/crawler";
