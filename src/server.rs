//! HTTP surface
//!
//! `POST /crawler` takes `{"url": "..."}`. Depending on [`ServerMode`] it answers
//! with the raw rendered markup or with the structured page record; only one
//! shape is mounted. Failures never surface as transport errors: the envelope
//! carries a 200/404/400 status and the details are only logged.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::ServerMode;
use crate::fetch::FetchController;
use crate::page_extractor::PageRecord;
use crate::utils::constants::WELCOME_MESSAGE;

/// State shared with the handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<FetchController>,
    pub mode: ServerMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrawlRequest {
    pub url: String,
}

/// Raw-markup envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlResponse {
    pub url: String,
    pub html: String,
    pub status: u16,
}

/// Structured-record envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeResponse {
    pub url: String,
    pub status: u16,
    pub page: Option<PageRecord>,
}

/// Build the axum router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/crawler", post(crawl))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn welcome() -> &'static str {
    WELCOME_MESSAGE
}

async fn crawl(
    State(state): State<AppState>,
    request: Result<Json<CrawlRequest>, JsonRejection>,
) -> Response {
    let url = match request {
        Ok(Json(request)) => request.url,
        Err(rejection) => {
            warn!(mode = ?state.mode, "Unreadable crawl request: {}", rejection.body_text());
            return rejected(state.mode);
        }
    };

    info!(url = %url, mode = ?state.mode, "Crawl requested");
    match state.mode {
        ServerMode::Raw => Json(crawl_raw(&state.controller, &url).await).into_response(),
        ServerMode::Structured => {
            Json(crawl_structured(&state.controller, &url).await).into_response()
        }
    }
}

/// Envelope for a request body that is not `{"url": "<string>"}`
fn rejected(mode: ServerMode) -> Response {
    match mode {
        ServerMode::Raw => Json(CrawlResponse {
            url: String::new(),
            html: String::new(),
            status: 400,
        })
        .into_response(),
        ServerMode::Structured => Json(ScrapeResponse {
            url: String::new(),
            status: 400,
            page: None,
        })
        .into_response(),
    }
}

/// Fetch `url` and wrap the rendered markup in the envelope
///
/// 200 when at least one response was observed, 404 when none was, otherwise
/// the error's status.
pub async fn crawl_raw(controller: &FetchController, url: &str) -> CrawlResponse {
    match controller.fetch_url(url).await {
        Ok(result) if result.has_response => CrawlResponse {
            url: result.url,
            html: result.html.unwrap_or_default(),
            status: 200,
        },
        Ok(_) => CrawlResponse {
            url: url.to_string(),
            html: String::new(),
            status: 404,
        },
        Err(e) => {
            warn!(url, status = e.status_code(), "Crawl failed: {}", e);
            CrawlResponse {
                url: url.to_string(),
                html: String::new(),
                status: e.status_code(),
            }
        }
    }
}

/// Scrape `url` into a page record and wrap it in the envelope
pub async fn crawl_structured(controller: &FetchController, url: &str) -> ScrapeResponse {
    match controller.scrape(url).await {
        Ok(page) => ScrapeResponse {
            url: page.url.clone(),
            status: 200,
            page: Some(page),
        },
        Err(e) => {
            warn!(url, status = e.status_code(), "Scrape failed: {}", e);
            ScrapeResponse {
                url: url.to_string(),
                status: e.status_code(),
                page: None,
            }
        }
    }
}
