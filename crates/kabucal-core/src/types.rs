use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::code::CompanyCode;
use crate::error::ResolveError;

/// Exchange-local wall-clock timestamp. All sources report Tokyo time, so
/// no offset is carried.
pub type Timestamp = NaiveDateTime;

/// Final confidence tier attached to a resolved datetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Highest,
    High,
    Medium,
    Low,
    None,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::Highest => write!(f, "highest"),
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::Low => write!(f, "low"),
            Confidence::None => write!(f, "none"),
        }
    }
}

/// How consistent a company's past announcement times are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceConfidence {
    High,
    Medium,
    Low,
    None,
}

/// How a datetime was read off an IR page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseConfidence {
    /// Date and time both matched by rule.
    High,
    /// Date matched by rule, time is the placeholder.
    Medium,
    /// Extracted by the LLM fallback.
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageType {
    Calendar,
    News,
    Library,
    Landing,
    #[default]
    Unknown,
}

impl std::fmt::Display for PageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageType::Calendar => write!(f, "calendar"),
            PageType::News => write!(f, "news"),
            PageType::Library => write!(f, "library"),
            PageType::Landing => write!(f, "landing"),
            PageType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Which cascade stage produced an IR URL. `Manual` marks entries an
/// operator seeded by editing the cache document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveredVia {
    Pattern,
    HomepageSearch,
    Llm,
    Manual,
}

impl std::fmt::Display for DiscoveredVia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveredVia::Pattern => write!(f, "pattern"),
            DiscoveredVia::HomepageSearch => write!(f, "homepage_search"),
            DiscoveredVia::Llm => write!(f, "llm"),
            DiscoveredVia::Manual => write!(f, "manual"),
        }
    }
}

/// One row reported by one source adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyObservation {
    pub code: CompanyCode,
    /// Empty when the source did not report a name.
    pub name: String,
    pub datetime: Option<Timestamp>,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceResult {
    pub inferred: Option<Timestamp>,
    pub confidence: InferenceConfidence,
    /// Most recent first.
    pub past: Vec<Timestamp>,
}

impl InferenceResult {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            inferred: None,
            confidence: InferenceConfidence::None,
            past: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IrPageInfo {
    pub url: String,
    pub page_type: PageType,
    pub discovered_via: DiscoveredVia,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EarningsInfo {
    pub datetime: Option<Timestamp>,
    pub confidence: ParseConfidence,
    pub has_exact_time: bool,
}

/// Persisted discovery result for one company. The code is the key of the
/// cache document, not a field of the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub ir_url: String,
    #[serde(default)]
    pub ir_type: PageType,
    #[serde(default)]
    pub last_known_datetime: Option<Timestamp>,
    pub discovered_via: DiscoveredVia,
    pub last_updated: Timestamp,
    #[serde(default)]
    pub success_count: u32,
}

impl CacheEntry {
    /// `true` once more than `ttl_days` have passed since `last_updated`.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp, ttl_days: u32) -> bool {
        now - self.last_updated > Duration::days(i64::from(ttl_days))
    }
}

/// Datetime reported by one named source for one company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDatetime {
    pub source: String,
    pub datetime: Option<Timestamp>,
}

/// Final resolved record for one company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateRecord {
    pub code: CompanyCode,
    pub name: String,
    pub datetime: Option<Timestamp>,
    pub confidence: Confidence,
    pub during_trading_hours: bool,
    /// Most likely first, no duplicates. Head equals `datetime`.
    pub candidate_datetimes: Vec<Timestamp>,
    /// One entry per requested source, in request order.
    pub source_datetimes: Vec<SourceDatetime>,
    pub ir_datetime: Option<Timestamp>,
    pub inferred_datetime: Option<Timestamp>,
    pub past_datetimes: Vec<Timestamp>,
}

impl CandidateRecord {
    #[must_use]
    pub fn source_datetime(&self, source: &str) -> Option<Timestamp> {
        self.source_datetimes
            .iter()
            .find(|s| s.source == source)
            .and_then(|s| s.datetime)
    }
}

/// Result of a source adapter health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceHealth {
    pub name: String,
    pub ok: bool,
    pub row_count: usize,
    pub error: Option<String>,
}

/// A source that failed or timed out during one resolution run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source: String,
    pub reason: String,
}

/// Parses a strict `YYYY-MM-DD` target date.
///
/// # Errors
///
/// Returns [`ResolveError::InvalidDate`] for any other shape or an
/// impossible calendar date.
pub fn parse_target_date(input: &str) -> Result<NaiveDate, ResolveError> {
    let invalid = || ResolveError::InvalidDate {
        input: input.to_string(),
    };
    let bytes = input.as_bytes();
    let shape_ok = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !shape_ok {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|_| invalid())
}
