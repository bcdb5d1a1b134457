//! URL canonicalization and internal/external link classification
//!
//! Both work on the raw string rather than a parsed URL. `www.` is removed
//! wherever it occurs, not only in the host; a path containing `www.` is
//! rewritten too. Known limitation, kept for record compatibility.

use super::schema::PageLink;
use super::text::normalize_joined;

/// Canonical form of `url`, stored on every page record
///
/// Drops the query string, a trailing `#` and one trailing `/`, removes every
/// `www.` and cuts at the first remaining `#`. These steps repeat until the
/// string stops changing, which makes the function idempotent.
///
/// Because of the repetition, every trailing `/` is removed, not just one:
/// `https://a.com/x//` becomes `https://a.com/x`.
///
/// ```rust
/// use kodegen_page_scraper::page_extractor::canonicalize;
/// assert_eq!(canonicalize("https://www.example.com/path/?q=1#frag"), "https://example.com/path");
/// ```
pub fn canonicalize(url: &str) -> String {
    let mut current = canonicalize_once(url);
    loop {
        let next = canonicalize_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn canonicalize_once(url: &str) -> String {
    let mut prefix = url.split('?').next().unwrap_or_default().to_string();

    // Covers both `/#` and `#`; a `/` left behind goes in the next step
    if prefix.ends_with('#') {
        prefix.pop();
    }
    if prefix.ends_with('/') {
        prefix.pop();
    }

    let prefix = prefix.replace("www.", "");
    prefix.split('#').next().unwrap_or_default().to_string()
}

/// Third `/`-delimited segment: the `host:port` part of an absolute URL
pub fn host_segment(url: &str) -> Option<&str> {
    url.split('/').nth(2)
}

/// Links partitioned relative to the page's own host
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedLinks {
    pub internal: Vec<PageLink>,
    pub external: Vec<PageLink>,
}

/// Partition `links` into internal and external relative to `reference_url`.
///
/// A link is internal when its host segment equals the reference host segment
/// with the first `www.` removed. Links without href are dropped. Link text is
/// normalized and rejoined with spaces.
pub fn classify(links: impl IntoIterator<Item = PageLink>, reference_url: &str) -> ClassifiedLinks {
    let reference_host = host_segment(reference_url).map(|host| host.replacen("www.", "", 1));
    let mut classified = ClassifiedLinks::default();

    for link in links {
        if link.href.is_empty() {
            continue;
        }

        let is_internal = matches!(
            (host_segment(&link.href), reference_host.as_deref()),
            (Some(host), Some(reference)) if host == reference
        );

        let link = PageLink {
            inner_text: normalize_joined(&link.inner_text),
            href: link.href,
            bias: 0.0,
        };

        if is_internal {
            classified.internal.push(link);
        } else {
            classified.external.push(link);
        }
    }

    classified
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(text: &str, href: &str) -> PageLink {
        PageLink {
            inner_text: text.to_string(),
            href: href.to_string(),
            bias: 0.0,
        }
    }

    #[test]
    fn canonicalize_examples() {
        assert_eq!(
            canonicalize("https://www.example.com/path/?q=1#frag"),
            "https://example.com/path"
        );
        assert_eq!(canonicalize("https://example.com/#"), "https://example.com");
        assert_eq!(canonicalize("https://example.com/a#section"), "https://example.com/a");
        assert_eq!(canonicalize("https://example.com"), "https://example.com");
    }

    #[test]
    fn canonicalize_strips_www_anywhere() {
        assert_eq!(
            canonicalize("https://example.com/www.page"),
            "https://example.com/page"
        );
    }

    #[test]
    fn canonicalize_repeats_until_stable() {
        assert_eq!(canonicalize("https://example.com//"), "https://example.com");
        assert_eq!(canonicalize("https://example.com/a/#/"), "https://example.com/a");
        assert_eq!(canonicalize("https://a.com/x//"), "https://a.com/x");
    }

    #[test]
    fn classify_by_host() {
        let classified = classify(
            vec![
                link("B", "https://example.com/b"),
                link("X", "https://other.com/x"),
                link("Nothing", ""),
            ],
            "https://example.com/a",
        );
        assert_eq!(classified.internal, vec![link("b", "https://example.com/b")]);
        assert_eq!(classified.external, vec![link("x", "https://other.com/x")]);
    }

    #[test]
    fn classify_strips_www_from_reference_only() {
        let classified = classify(
            vec![
                link("", "https://example.com/b"),
                link("", "https://www.example.com/c"),
            ],
            "https://www.example.com/",
        );
        assert_eq!(classified.internal.len(), 1);
        assert_eq!(classified.external.len(), 1);
        assert_eq!(classified.external[0].href, "https://www.example.com/c");
    }

    #[test]
    fn classify_normalizes_link_text() {
        let classified = classify(
            vec![link("Read\tMore\n\nNow", "https://example.com/more")],
            "https://example.com",
        );
        assert_eq!(classified.internal[0].inner_text, "read more now");
    }

    #[test]
    fn hostless_reference_makes_everything_external() {
        let classified = classify(vec![link("a", "https://example.com/a")], "not-a-url");
        assert!(classified.internal.is_empty());
        assert_eq!(classified.external.len(), 1);
    }
}
