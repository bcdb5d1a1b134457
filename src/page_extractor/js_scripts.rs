//! In-page scripts issued by the extraction pipeline
//!
//! Each script is a self-contained expression. Per-element reads are wrapped in
//! try/catch so one unreadable element degrades to `null` instead of failing the
//! whole query; a failure outside the per-element callback fails the query.

/// Every `<meta>` under `<head>` as `{name, content}` (`null` when unreadable)
pub const META_TAGS_SCRIPT: &str = r#"(() => Array.from(document.querySelectorAll('head > meta')).map(tag => {
    try {
        return {
            name: tag.getAttribute('name') || tag.getAttribute('property'),
            content: tag.getAttribute('content')
        };
    } catch (e) {
        return null;
    }
}))()"#;

/// Root element `lang` attribute, or `null`
pub const LANGUAGE_SCRIPT: &str = r#"(() => {
    try {
        const root = document.querySelector('html');
        return root ? root.getAttribute('lang') : null;
    } catch (e) {
        return null;
    }
})()"#;

/// Rendered text of the document body. Throws when there is no body.
pub const BODY_TEXT_SCRIPT: &str = "document.body.innerText";

/// Rendered text of the first `<article>`, or `null`
pub const ARTICLE_SCRIPT: &str = r#"(() => {
    try {
        const article = document.querySelector('article');
        return article ? article.innerText : null;
    } catch (e) {
        return null;
    }
})()"#;

/// Every anchor as `{innerText, href, bias}` with the href resolved to absolute
pub const LINKS_SCRIPT: &str = r#"(() => Array.from(document.querySelectorAll('a')).map(link => {
    try {
        return { innerText: link.innerText, href: link.href, bias: 0 };
    } catch (e) {
        return null;
    }
}))()"#;

/// Rendered text of every heading of `level` (1-6), `""` when unreadable
pub fn headings_script(level: u8) -> String {
    format!(
        r#"(() => Array.from(document.querySelectorAll('h{level}')).map(h => {{
    try {{
        return h.innerText;
    }} catch (e) {{
        return '';
    }}
}}))()"#
    )
}
