//! Headless-browser page fetching and structured page extraction
//!
//! Fetches URLs through a pool of live Chrome instances with crash recovery,
//! races page loads against timeouts, and distills rendered pages into
//! normalized records via chromiumoxide.

pub mod browser;
pub mod browser_setup;
pub mod fetch;
pub mod manager;
pub mod page_extractor;
pub mod server;
pub mod utils;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::browser::ResourceKind;
use crate::fetch::LoadStrategy;
use crate::utils::constants::{
    DEFAULT_CONTENT_TIMEOUT_MS, DEFAULT_DYNAMIC_TIMEOUT_MS, DEFAULT_EXTRACTION_TIMEOUT_MS, DEFAULT_NAVIGATION_GRACE_MS,
    DEFAULT_NAVIGATION_TIMEOUT_MS, DEFAULT_RETIRE_GRACE_MS, DEFAULT_STATIC_TIMEOUT_MS,
};
use crate::utils::{MAX_CONTENT_TIMEOUT_MS, MAX_NAVIGATION_TIMEOUT_MS, validate_timeout};

/// Environment variable pointing at the YAML config file
pub const CONFIG_PATH_ENV: &str = "PAGE_SCRAPER_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub fetch: FetchConfig,
}

/// Which response shape `POST /crawler` serves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    /// `{url, html, status}` with the rendered markup
    #[default]
    Raw,
    /// `{url, status, page}` with the extracted page record
    Structured,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub mode: ServerMode,
}

/// Browser launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Disable web security features (Same-Origin Policy, etc.)
    /// WARNING: Only enable for trusted content
    #[serde(default = "default_disable_security")]
    pub disable_security: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// How long a replaced browser stays open for its in-flight pages
    #[serde(default = "default_retire_grace_ms")]
    pub retire_grace_ms: u64,
}

impl PoolConfig {
    pub fn retire_grace(&self) -> Duration {
        Duration::from_millis(self.retire_grace_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Navigation bound on the serving path
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,

    /// Extra time the controller's timer allows beyond a navigation bound
    #[serde(default = "default_navigation_grace_ms")]
    pub navigation_grace_ms: u64,

    #[serde(default = "default_content_timeout_ms")]
    pub content_timeout_ms: u64,

    /// Bound on the extraction pipeline on the scraping path
    #[serde(default = "default_extraction_timeout_ms")]
    pub extraction_timeout_ms: u64,

    /// DynamicWait bound on the scraping path
    #[serde(default = "default_dynamic_timeout_ms")]
    pub dynamic_timeout_ms: u64,

    /// StaticWait bound on the scraping path
    #[serde(default = "default_static_timeout_ms")]
    pub static_timeout_ms: u64,

    /// Load strategy of the serving path
    #[serde(default = "default_load_strategy")]
    pub load_strategy: LoadStrategy,

    #[serde(default = "default_blocked_resources")]
    pub blocked_resources: Vec<ResourceKind>,
}

impl FetchConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn navigation_grace(&self) -> Duration {
        Duration::from_millis(self.navigation_grace_ms)
    }

    pub fn content_timeout(&self) -> Duration {
        Duration::from_millis(self.content_timeout_ms)
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_millis(self.extraction_timeout_ms)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

fn default_headless() -> bool {
    true
}

fn default_disable_security() -> bool {
    false // SECURE BY DEFAULT
}

fn default_retire_grace_ms() -> u64 {
    DEFAULT_RETIRE_GRACE_MS
}

fn default_navigation_timeout_ms() -> u64 {
    DEFAULT_NAVIGATION_TIMEOUT_MS
}
fn default_navigation_grace_ms() -> u64 {
    DEFAULT_NAVIGATION_GRACE_MS
}
fn default_content_timeout_ms() -> u64 {
    DEFAULT_CONTENT_TIMEOUT_MS
}
fn default_extraction_timeout_ms() -> u64 {
    DEFAULT_EXTRACTION_TIMEOUT_MS
}
fn default_dynamic_timeout_ms() -> u64 {
    DEFAULT_DYNAMIC_TIMEOUT_MS
}
fn default_static_timeout_ms() -> u64 {
    DEFAULT_STATIC_TIMEOUT_MS
}
fn default_load_strategy() -> LoadStrategy {
    LoadStrategy::DynamicWait
}
fn default_blocked_resources() -> Vec<ResourceKind> {
    ResourceKind::BLOCKED_BY_DEFAULT.to_vec()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            mode: ServerMode::default(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            disable_security: default_disable_security(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            retire_grace_ms: default_retire_grace_ms(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: default_navigation_timeout_ms(),
            navigation_grace_ms: default_navigation_grace_ms(),
            content_timeout_ms: default_content_timeout_ms(),
            extraction_timeout_ms: default_extraction_timeout_ms(),
            dynamic_timeout_ms: default_dynamic_timeout_ms(),
            static_timeout_ms: default_static_timeout_ms(),
            load_strategy: default_load_strategy(),
            blocked_resources: default_blocked_resources(),
        }
    }
}

impl Config {
    /// Reject timeouts that are zero or beyond their caps
    pub fn validate(&self) -> ScrapeResult<()> {
        let fetch = &self.fetch;
        for (field, ms) in [
            ("fetch.navigation_timeout_ms", fetch.navigation_timeout_ms),
            ("fetch.dynamic_timeout_ms", fetch.dynamic_timeout_ms),
            ("fetch.static_timeout_ms", fetch.static_timeout_ms),
            ("pool.retire_grace_ms", self.pool.retire_grace_ms),
        ] {
            validate_timeout(field, ms, MAX_NAVIGATION_TIMEOUT_MS)?;
        }
        for (field, ms) in [
            ("fetch.content_timeout_ms", fetch.content_timeout_ms),
            ("fetch.extraction_timeout_ms", fetch.extraction_timeout_ms),
        ] {
            validate_timeout(field, ms, MAX_CONTENT_TIMEOUT_MS)?;
        }
        Ok(())
    }
}

/// Load config from `$PAGE_SCRAPER_CONFIG`, else `config.yaml` in the working
/// directory, else defaults
pub fn load_yaml_config() -> anyhow::Result<Config> {
    let config_path = std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.yaml"));

    let config = if config_path.exists() {
        let contents = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?
    } else {
        Config::default()
    };

    config.validate()?;
    Ok(config)
}

pub use browser::{
    BrowserEngine, BrowserError, BrowserInstance, BrowserResult, ChromeEngine, PageSession,
};
pub use fetch::{FetchController, FetchResult, NavigationReport};
pub use manager::{BrowserHandle, BrowserPool, HandleState};
pub use page_extractor::{PageLink, PageRecord};
pub use utils::{ScrapeError, ScrapeResult};

/// Start the page scraper HTTP server on Chrome
///
/// Blocks until shutdown (Ctrl-C, SIGTERM, or an unrecoverable browser pool).
pub async fn start_server(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    let engine = Arc::new(ChromeEngine::new(config.browser.clone()));
    start_server_with_listener(listener, config, engine).await
}

/// Start the server on a pre-bound listener with the given engine
pub async fn start_server_with_listener(
    listener: tokio::net::TcpListener,
    config: Config,
    engine: Arc<dyn BrowserEngine>,
) -> anyhow::Result<()> {
    let pool = BrowserPool::start(engine, config.pool.clone())
        .await
        .context("Failed to start browser pool")?;

    let controller = Arc::new(FetchController::new(pool.clone(), config.fetch.clone()));
    let app = server::router(server::AppState {
        controller,
        mode: config.server.mode,
    });

    info!(
        addr = %listener.local_addr().context("Listener has no local address")?,
        mode = ?config.server.mode,
        "Server started"
    );

    let fatal = pool.fatal_signal();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(fatal.clone()))
        .await
        .context("Server error");

    pool.shutdown().await;
    served?;

    if fatal.is_cancelled() {
        anyhow::bail!("Browser pool could not replace a failed browser");
    }
    Ok(())
}

async fn shutdown_signal(fatal: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
        _ = fatal.cancelled() => error!("Browser pool is unrecoverable, shutting down"),
    }
}
