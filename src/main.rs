// HTTP server: headless-browser page scraper
//
// POST /crawler {"url": "..."} fetches the page through a pooled Chrome
// instance. Configuration comes from config.yaml or $PAGE_SCRAPER_CONFIG.

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,kodegen_page_scraper=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = kodegen_page_scraper::load_yaml_config().context("Failed to load configuration")?;
    tracing::info!(
        port = config.server.port,
        mode = ?config.server.mode,
        "Starting page scraper"
    );

    kodegen_page_scraper::start_server(config).await
}
