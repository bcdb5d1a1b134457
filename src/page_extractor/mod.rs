//! Page extraction pipeline
//!
//! Turns one rendered page into a canonical [`PageRecord`]: meta tags, title,
//! language, headings, body text, article text and classified links, queried
//! concurrently and joined.

pub mod extractors;
pub mod js_scripts;
pub mod links;
pub mod schema;
pub mod text;

pub use links::{ClassifiedLinks, canonicalize, classify, host_segment};
pub use schema::{Headings, MetaTag, PageBody, PageLink, PageMetadata, PageRecord};
pub use text::{normalize, normalize_joined, split_lines};

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::browser::PageSession;
use crate::utils::ScrapeResult;
use extractors::{
    extract_article_text, extract_body_text, extract_headings, extract_language, extract_links,
    extract_meta_tags, extract_title,
};

/// Everything the page queries returned, before assembly
#[derive(Debug, Clone, Default)]
pub struct ExtractedParts {
    pub title: String,
    pub meta_tags: Vec<MetaTag>,
    pub language: Option<String>,
    pub headings: Headings,
    pub body_text: String,
    pub article_text: Option<String>,
    pub links: Vec<PageLink>,
}

/// Run every query against `page` concurrently and assemble the record
///
/// # Errors
/// `ScrapeError::Extraction` if any whole query category fails.
pub async fn extract_page_record(
    page: Arc<dyn PageSession>,
    original_url: &str,
) -> ScrapeResult<PageRecord> {
    let (title, meta_tags, language, headings, body_text, article_text, links) = tokio::try_join!(
        extract_title(&page),
        extract_meta_tags(&page),
        extract_language(&page),
        extract_headings(&page),
        extract_body_text(&page),
        extract_article_text(&page),
        extract_links(&page),
    )?;

    debug!(
        url = original_url,
        meta_tags = meta_tags.len(),
        links = links.len(),
        "Page queries complete"
    );

    let parts = ExtractedParts {
        title,
        meta_tags,
        language,
        headings,
        body_text,
        article_text,
        links,
    };

    Ok(assemble_record(
        parts,
        original_url,
        chrono::Utc::now().timestamp_millis(),
    ))
}

/// Join query results into a page record stamped with `crawled_at_ms`
pub fn assemble_record(parts: ExtractedParts, original_url: &str, crawled_at_ms: i64) -> PageRecord {
    // Later tags override earlier ones; empty contents count as absent
    let meta: HashMap<&str, &str> = parts
        .meta_tags
        .iter()
        .filter(|tag| !tag.name.is_empty())
        .map(|tag| (tag.name.as_str(), tag.content.as_str()))
        .collect();
    let lookup = |name: &str| {
        meta.get(name)
            .filter(|content| !content.is_empty())
            .map(|content| content.to_string())
    };

    let description = lookup("description")
        .or_else(|| lookup("og:description"))
        .map(|description| normalize_joined(&description));
    let tags = lookup("keywords").map(|keywords| keywords.split(',').map(str::to_string).collect());

    let metadata = PageMetadata {
        title: parts.title,
        author: lookup("author"),
        description,
        open_graph_image: lookup("og:image"),
        open_graph_title: lookup("og:title"),
        page_type: lookup("og:type"),
        tags,
        site_name: lookup("og:site_name"),
        // Favicon probing is not performed
        has_icon: true,
        language: parts.language,
    };

    let ClassifiedLinks { internal, external } = classify(parts.links, original_url);

    PageRecord {
        metadata,
        body: PageBody {
            headings: parts.headings,
            plaintext: normalize(&parts.body_text),
            article: parts.article_text.as_deref().map(split_lines),
            internal_links: internal,
            external_links: external,
        },
        url: canonicalize(original_url),
        crawler_timestamp: crawled_at_ms,
        user_rating: 0.0,
        bias: 0.0,
        created_timestamp: 0,
    }
}
