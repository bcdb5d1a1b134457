//! Per-category page queries
//!
//! Each function issues one query category against the page. A category that
//! fails as a whole returns `ScrapeError::Extraction`; individual elements that
//! cannot be decoded degrade in place (see each function).

use std::sync::Arc;

use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use super::js_scripts::{
    ARTICLE_SCRIPT, BODY_TEXT_SCRIPT, LANGUAGE_SCRIPT, LINKS_SCRIPT, META_TAGS_SCRIPT,
    headings_script,
};
use super::schema::{Headings, MetaTag, PageLink};
use super::text::normalize_joined;
use crate::browser::{BrowserError, PageSession};
use crate::utils::{ScrapeError, ScrapeResult};

/// Decode every array element independently; undecodable elements become `None`
fn decode_each<T: DeserializeOwned>(category: &'static str, value: Value) -> ScrapeResult<Vec<Option<T>>> {
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .map(|item| match serde_json::from_value(item) {
                Ok(decoded) => Some(decoded),
                Err(e) => {
                    trace!(category, "Degrading unreadable element: {}", e);
                    None
                }
            })
            .collect()),
        Value::Null => Ok(Vec::new()),
        other => Err(ScrapeError::Extraction {
            category,
            source: BrowserError::UnexpectedValue(format!("expected an array, got {other}")),
        }),
    }
}

async fn evaluate(
    page: &Arc<dyn PageSession>,
    category: &'static str,
    script: &str,
) -> ScrapeResult<Value> {
    page.evaluate(script)
        .await
        .map_err(|source| ScrapeError::Extraction { category, source })
}

/// Meta tags; an unreadable tag becomes an empty entry
pub async fn extract_meta_tags(page: &Arc<dyn PageSession>) -> ScrapeResult<Vec<MetaTag>> {
    #[derive(serde::Deserialize)]
    struct RawMetaTag {
        name: Option<String>,
        content: Option<String>,
    }

    let value = evaluate(page, "meta tags", META_TAGS_SCRIPT).await?;
    Ok(decode_each::<RawMetaTag>("meta tags", value)?
        .into_iter()
        .map(|raw| {
            raw.map(|raw| MetaTag {
                name: raw.name.unwrap_or_default(),
                content: raw.content.unwrap_or_default(),
            })
            .unwrap_or_default()
        })
        .collect())
}

pub async fn extract_title(page: &Arc<dyn PageSession>) -> ScrapeResult<String> {
    page.title().await.map_err(|source| ScrapeError::Extraction {
        category: "title",
        source,
    })
}

/// Root `lang` attribute. Anything unreadable is `None` rather than an error.
pub async fn extract_language(page: &Arc<dyn PageSession>) -> ScrapeResult<Option<String>> {
    match page.evaluate(LANGUAGE_SCRIPT).await {
        Ok(Value::String(lang)) if !lang.is_empty() => Ok(Some(lang)),
        Ok(_) => Ok(None),
        Err(e) => {
            trace!("Language unreadable: {}", e);
            Ok(None)
        }
    }
}

/// Normalized heading texts for h1-h6, queried concurrently
pub async fn extract_headings(page: &Arc<dyn PageSession>) -> ScrapeResult<Headings> {
    let levels = try_join_all(Headings::LEVELS.map(|level| async move {
        let value = evaluate(page, "headings", &headings_script(level)).await?;
        Ok::<_, ScrapeError>(
            decode_each::<String>("headings", value)?
                .into_iter()
                .map(|text| normalize_joined(&text.unwrap_or_default()))
                .collect::<Vec<_>>(),
        )
    }))
    .await?;

    Ok(Headings::from_levels(levels))
}

/// Raw rendered body text
pub async fn extract_body_text(page: &Arc<dyn PageSession>) -> ScrapeResult<String> {
    match evaluate(page, "body text", BODY_TEXT_SCRIPT).await? {
        Value::String(text) => Ok(text),
        Value::Null => Ok(String::new()),
        other => Err(ScrapeError::Extraction {
            category: "body text",
            source: BrowserError::UnexpectedValue(format!("expected a string, got {other}")),
        }),
    }
}

/// Raw text of the first `<article>`, if any
pub async fn extract_article_text(page: &Arc<dyn PageSession>) -> ScrapeResult<Option<String>> {
    match evaluate(page, "article", ARTICLE_SCRIPT).await? {
        Value::String(text) => Ok(Some(text)),
        _ => Ok(None),
    }
}

/// Anchors with resolved hrefs; unreadable anchors are dropped
pub async fn extract_links(page: &Arc<dyn PageSession>) -> ScrapeResult<Vec<PageLink>> {
    let value = evaluate(page, "links", LINKS_SCRIPT).await?;
    Ok(decode_each::<PageLink>("links", value)?
        .into_iter()
        .flatten()
        .collect())
}
