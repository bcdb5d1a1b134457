//! Canonical page record produced by the extraction pipeline

use serde::{Deserialize, Serialize};

/// One `<meta>` element as name/content pair
///
/// `name` falls back to the `property` attribute, so Open Graph tags
/// (`og:title`, ...) land here too. A tag that could not be read is an empty entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTag {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
}

/// A hyperlink found on the page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLink {
    #[serde(default)]
    pub inner_text: String,
    #[serde(default)]
    pub href: String,
    /// Reserved ranking weight, always 0 here
    #[serde(default)]
    pub bias: f64,
}

/// Heading texts per level, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headings {
    pub h1: Vec<String>,
    pub h2: Vec<String>,
    pub h3: Vec<String>,
    pub h4: Vec<String>,
    pub h5: Vec<String>,
    pub h6: Vec<String>,
}

impl Headings {
    pub const LEVELS: std::ops::RangeInclusive<u8> = 1..=6;

    /// Build from the six levels in order h1..h6
    pub fn from_levels(levels: Vec<Vec<String>>) -> Self {
        let mut levels = levels.into_iter();
        let mut next = || levels.next().unwrap_or_default();
        Self {
            h1: next(),
            h2: next(),
            h3: next(),
            h4: next(),
            h5: next(),
            h6: next(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub open_graph_image: Option<String>,
    pub open_graph_title: Option<String>,
    #[serde(rename = "type")]
    pub page_type: Option<String>,
    pub tags: Option<Vec<String>>,
    pub site_name: Option<String>,
    pub has_icon: bool,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageBody {
    pub headings: Headings,
    pub plaintext: Vec<String>,
    pub article: Option<Vec<String>>,
    pub internal_links: Vec<PageLink>,
    pub external_links: Vec<PageLink>,
}

/// Structured, normalized view of one rendered page
///
/// `url` is always the canonical form of the requested URL. The scoring fields
/// are extension points for downstream consumers and stay zero here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    pub metadata: PageMetadata,
    pub body: PageBody,
    pub url: String,
    /// Epoch milliseconds at extraction time
    pub crawler_timestamp: i64,
    pub user_rating: f64,
    pub bias: f64,
    pub created_timestamp: i64,
}
