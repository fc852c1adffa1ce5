//! HTML text and link helpers for IR pages.
//!
//! IR pages are scanned with regexes rather than a DOM: the parser only
//! needs row-level text blocks and the cascade only needs anchors.

use std::sync::LazyLock;

use regex::Regex;

use crate::urls::resolve_url;

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").expect("valid regex"));
static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b.*?</style\s*>").expect("valid regex"));
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static BLOCK_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)</?(?:tr|li|p|div|section|article|h[1-6]|table|ul|ol|dl|header|footer|main|nav|tbody|thead)\b[^>]*>",
    )
    .expect("valid regex")
});
static INLINE_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?(?:td|th|dt|dd|br)\b[^>]*>").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid regex"));
static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a\s*>"#)
        .expect("valid regex")
});
static NUMERIC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("valid regex"));

/// A hyperlink found on a page: resolved target plus visible text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub url: String,
    pub text: String,
}

/// Collects anchors from `html` in document order, resolving hrefs
/// against `base`. Pseudo-links are dropped.
pub fn extract_anchors(html: &str, base: &str) -> Vec<Anchor> {
    ANCHOR_RE
        .captures_iter(html)
        .filter_map(|cap| {
            let href = decode_entities(cap.get(1)?.as_str());
            let url = resolve_url(&href, base)?;
            let text = clean_text(&decode_entities(cap.get(2).map_or("", |m| m.as_str())));
            Some(Anchor { url, text })
        })
        .collect()
}

/// Flattens `html` into row-level text blocks.
///
/// Table rows, list items, paragraphs, divs and headings each become their
/// own block; table cells within a row are joined with spaces.
pub fn flatten_blocks(html: &str) -> Vec<String> {
    let stripped = SCRIPT_RE.replace_all(html, " ");
    let stripped = STYLE_RE.replace_all(&stripped, " ");
    let stripped = COMMENT_RE.replace_all(&stripped, " ");
    let broken = BLOCK_TAG_RE.replace_all(&stripped, "\n");
    let spaced = INLINE_BREAK_RE.replace_all(&broken, " ");
    let text = TAG_RE.replace_all(&spaced, "");
    let decoded = decode_entities(&text);

    decoded
        .lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect()
}

/// The page as one whitespace-collapsed string.
pub fn page_text(html: &str) -> String {
    flatten_blocks(html).join("\n")
}

pub fn clean_text(input: &str) -> String {
    let no_tags = TAG_RE.replace_all(input, " ");
    collapse_whitespace(&no_tags)
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decodes the named entities common on Japanese corporate sites plus
/// numeric references.
pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let numeric = NUMERIC_ENTITY_RE.replace_all(input, |cap: &regex::Captures<'_>| {
        let raw = &cap[1];
        let code = if let Some(hex) = raw.strip_prefix('x') {
            u32::from_str_radix(hex, 16).ok()
        } else {
            raw.parse::<u32>().ok()
        };
        code.and_then(char::from_u32)
            .map_or_else(|| cap[0].to_string(), |c| c.to_string())
    });

    numeric
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// First `max_chars` characters of `s`, never splitting a code point.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
