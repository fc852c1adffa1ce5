//! IR URL synthesis, resolution and page-type heuristics.

use kabucal_core::PageType;
use reqwest::Url;

/// Earnings-calendar and disclosure pages. Probed before landing pages
/// because they are more likely to carry the datetime itself.
const CALENDAR_PATHS: [&str; 21] = [
    "/ir/calendar/",
    "/ir/calendar.html",
    "/ir/schedule/",
    "/ir/schedule.html",
    "/ir/event/",
    "/ir/events/",
    "/ir/kessan/",
    "/ir/gyoseki/",
    "/ir/zaimu/",
    "/ir/library/",
    "/ir/news/",
    "/ir/release/",
    "/ir/whatsnew/",
    "/ir/stock/",
    "/ir/kabunushi/",
    "/ir/financial/",
    "/ir/finance/",
    "/ir/results/",
    "/ir/data/",
    "/ir/calendar/index.html",
    "/ir/schedule/index.html",
];

const LANDING_PATHS: [&str; 12] = [
    "/ir/",
    "/investor/",
    "/investors/",
    "/ir.html",
    "/corporate/ir/",
    "/about/ir/",
    "/company/ir/",
    "/jp/ir/",
    "/ja/ir/",
    "/ja-jp/ir/",
    "/ir/index.html",
    "/ir/index.htm",
];

const CALENDAR_URL_TOKENS: [&str; 3] = ["/calendar", "/schedule", "/event"];
const NEWS_URL_TOKENS: [&str; 4] = ["/news", "/release", "/whatsnew", "/topics"];
const LIBRARY_URL_TOKENS: [&str; 3] = ["/library", "/document", "/report"];
const LANDING_URL_SUFFIXES: [&str; 3] = ["/ir", "/investor", "/investors"];

const CALENDAR_CONTENT_TOKENS: [&str; 4] =
    ["決算カレンダー", "決算発表予定", "irカレンダー", "earnings calendar"];
const LANDING_CONTENT_TOKENS: [&str; 3] = ["ir情報", "投資家情報", "investor relations"];

/// Reduces a company website to `scheme://host[:port]`. Bare hosts get
/// `https://`.
pub fn normalize_base_url(raw: &str) -> Option<String> {
    let url = parse_website(raw)?;
    Some(url.origin().ascii_serialization())
}

fn parse_website(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let url = if raw.starts_with("http://") || raw.starts_with("https://") {
        Url::parse(raw).ok()?
    } else {
        Url::parse(&format!("https://{raw}")).ok()?
    };

    url.host_str()?;
    Some(url)
}

/// Ordered list of URLs the pattern stage probes for `website`.
///
/// Calendar paths come first, then landing paths, then the website's own
/// path with `/ir/` appended. `stale` (a previously cached URL) is
/// probed before everything else.
pub fn candidate_urls(website: &str, stale: Option<&str>) -> Vec<String> {
    let Some(site) = parse_website(website) else {
        return Vec::new();
    };
    let base = site.origin().ascii_serialization();

    let mut candidates: Vec<String> = Vec::new();
    let mut push = |url: String| {
        if !candidates.contains(&url) {
            candidates.push(url);
        }
    };

    if let Some(url) = stale.filter(|s| !s.trim().is_empty()) {
        push(url.trim().to_string());
    }

    for path in CALENDAR_PATHS.iter().chain(LANDING_PATHS.iter()) {
        push(format!("{base}{path}"));
    }

    let own_path = site.path().trim_end_matches('/');
    if !own_path.is_empty() {
        push(format!("{base}{own_path}/ir/"));
    }

    candidates
}

/// Resolves `raw` (absolute, protocol-relative, or relative) against
/// `base`. Fragment-only, `mailto:` and `javascript:` links yield `None`.
pub fn resolve_url(raw: &str, base: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty()
        || raw.starts_with('#')
        || raw.starts_with("mailto:")
        || raw.starts_with("javascript:")
        || raw.starts_with("tel:")
    {
        return None;
    }

    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Url::parse(raw).ok().map(|mut url| {
            url.set_fragment(None);
            url.to_string()
        });
    }

    let base_url = parse_website(base)?;
    let mut joined = base_url.join(raw).ok()?;
    joined.set_fragment(None);
    Some(joined.to_string())
}

/// Classifies an IR page from its URL, falling back to page content when
/// the URL says nothing.
pub fn classify_page_type(url: &str, html: Option<&str>) -> PageType {
    let path = Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| url.to_lowercase());

    if CALENDAR_URL_TOKENS.iter().any(|t| path.contains(t)) {
        return PageType::Calendar;
    }
    if NEWS_URL_TOKENS.iter().any(|t| path.contains(t)) {
        return PageType::News;
    }
    if LIBRARY_URL_TOKENS.iter().any(|t| path.contains(t)) {
        return PageType::Library;
    }

    let trimmed = path
        .trim_end_matches('/')
        .trim_end_matches("/index.html")
        .trim_end_matches("/index.htm")
        .trim_end_matches(".html");
    if LANDING_URL_SUFFIXES.iter().any(|s| trimmed.ends_with(s)) {
        return PageType::Landing;
    }

    let Some(html) = html else {
        return PageType::Unknown;
    };
    let lower = html.to_lowercase();
    if CALENDAR_CONTENT_TOKENS.iter().any(|t| lower.contains(t)) {
        PageType::Calendar
    } else if LANDING_CONTENT_TOKENS.iter().any(|t| lower.contains(t)) {
        PageType::Landing
    } else {
        PageType::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_path_and_adds_scheme() {
        assert_eq!(
            normalize_base_url("www.toyota.co.jp/jpn/company/").as_deref(),
            Some("https://www.toyota.co.jp")
        );
        assert_eq!(
            normalize_base_url("http://127.0.0.1:8080/about").as_deref(),
            Some("http://127.0.0.1:8080")
        );
        assert!(normalize_base_url("   ").is_none());
    }

    #[test]
    fn candidates_put_calendar_paths_before_landing_paths() {
        let urls = candidate_urls("https://example.co.jp", None);
        let calendar = urls
            .iter()
            .position(|u| u == "https://example.co.jp/ir/calendar/")
            .unwrap();
        let landing = urls
            .iter()
            .position(|u| u == "https://example.co.jp/ir/")
            .unwrap();
        assert_eq!(calendar, 0);
        assert!(calendar < landing);
    }

    #[test]
    fn candidates_append_site_path_with_ir_suffix() {
        let urls = candidate_urls("https://example.co.jp/company/jp/", None);
        assert_eq!(
            urls.last().map(String::as_str),
            Some("https://example.co.jp/company/jp/ir/")
        );
    }

    #[test]
    fn candidates_probe_stale_url_first_without_duplicates() {
        let urls = candidate_urls(
            "https://example.co.jp",
            Some("https://example.co.jp/ir/schedule/"),
        );
        assert_eq!(urls[0], "https://example.co.jp/ir/schedule/");
        let count = urls
            .iter()
            .filter(|u| *u == "https://example.co.jp/ir/schedule/")
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn resolve_handles_relative_and_skips_pseudo_links() {
        assert_eq!(
            resolve_url("/ir/index.html#top", "https://example.co.jp").as_deref(),
            Some("https://example.co.jp/ir/index.html")
        );
        assert_eq!(
            resolve_url("//cdn.example.co.jp/ir/", "https://example.co.jp").as_deref(),
            Some("https://cdn.example.co.jp/ir/")
        );
        assert!(resolve_url("javascript:void(0)", "https://example.co.jp").is_none());
        assert!(resolve_url("#", "https://example.co.jp").is_none());
    }

    #[test]
    fn classify_uses_url_tokens_first() {
        assert_eq!(
            classify_page_type("https://example.co.jp/ir/calendar/", None),
            PageType::Calendar
        );
        assert_eq!(
            classify_page_type("https://example.co.jp/ir/news/2026.html", None),
            PageType::News
        );
        assert_eq!(
            classify_page_type("https://example.co.jp/ir/library/", None),
            PageType::Library
        );
        assert_eq!(
            classify_page_type("https://example.co.jp/investors/", None),
            PageType::Landing
        );
        assert_eq!(
            classify_page_type("https://example.co.jp/ir/index.html", None),
            PageType::Landing
        );
    }

    #[test]
    fn classify_falls_back_to_content() {
        let html = "<h1>IRカレンダー</h1>";
        assert_eq!(
            classify_page_type("https://example.co.jp/kabu/", Some(html)),
            PageType::Calendar
        );
        assert_eq!(
            classify_page_type("https://example.co.jp/kabu/", Some("<p>hello</p>")),
            PageType::Unknown
        );
    }
}
