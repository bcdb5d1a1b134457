//! Text normalization for extracted strings

/// Clean a raw extracted string into canonical lines.
///
/// Tabs become single spaces, everything is lowercased, the string is split on
/// `\n` and empty segments are dropped. Order is preserved.
///
/// ```rust
/// use kodegen_page_scraper::page_extractor::normalize;
/// assert_eq!(normalize("Foo\tBar\n\nBaz"), vec!["foo bar", "baz"]);
/// ```
pub fn normalize(raw: &str) -> Vec<String> {
    raw.replace('\t', " ")
        .to_lowercase()
        .split('\n')
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalize and rejoin the lines with single spaces
pub fn normalize_joined(raw: &str) -> String {
    normalize(raw).join(" ")
}

/// Split into non-empty lines without any other change
pub fn split_lines(raw: &str) -> Vec<String> {
    raw.split('\n')
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
