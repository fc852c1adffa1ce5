//! Source adapters: per-site earnings calendars behind one capability
//! interface.

mod http_json;

use async_trait::async_trait;
use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Weekday,
};
use kabucal_core::{CompanyCode, CompanyObservation, SourceHealth, Timestamp};

use crate::error::SourceError;

pub use http_json::HttpJsonSource;

/// Tokyo is UTC+9 with no daylight saving.
const EXCHANGE_UTC_OFFSET_SECS: i32 = 9 * 3600;

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

/// One row as a source reported it, before code validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObservation {
    pub code: String,
    pub name: String,
    pub datetime: Option<Timestamp>,
}

/// An earnings calendar for one target date.
///
/// The resolver depends only on this trait; it never sees a concrete site
/// adapter.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable lowercase identifier, also the per-source column name.
    fn name(&self) -> &str;

    /// Rows announced for `date`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the calendar cannot be fetched or decoded.
    async fn fetch(&self, date: NaiveDate) -> Result<Vec<RawObservation>, SourceError>;

    /// Operational probe: can this source currently produce rows?
    async fn health_check(&self) -> SourceHealth;

    /// [`fetch`](Self::fetch) plus code validation. Rows whose code is not
    /// four ASCII alphanumerics are dropped; rows without a datetime are
    /// kept.
    ///
    /// # Errors
    ///
    /// Propagates the [`SourceError`] from `fetch`.
    async fn fetch_validated(&self, date: NaiveDate) -> Result<Vec<CompanyObservation>, SourceError> {
        let raw = self.fetch(date).await?;
        let total = raw.len();

        let observations: Vec<CompanyObservation> = raw
            .into_iter()
            .filter_map(|row| {
                let code = CompanyCode::parse(&row.code).ok()?;
                Some(CompanyObservation {
                    code,
                    name: row.name,
                    datetime: row.datetime,
                    source: self.name().to_string(),
                })
            })
            .collect();

        let dropped = total - observations.len();
        if dropped > 0 {
            tracing::warn!(source = self.name(), dropped, "dropped rows with invalid company codes");
        }
        tracing::debug!(source = self.name(), rows = observations.len(), "source fetched");

        Ok(observations)
    }
}

/// The first Monday-to-Friday date strictly after `today`.
#[must_use]
pub fn next_weekday(today: NaiveDate) -> NaiveDate {
    let mut day = today + Duration::days(1);
    while matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
        day += Duration::days(1);
    }
    day
}

/// Parses a datetime as sources emit it. A bare `HH:MM[:SS]` is taken to
/// be on `date`. Offset-bearing values are converted to exchange-local
/// (JST) wall time before the offset is dropped.
#[must_use]
pub fn parse_source_datetime(raw: &str, date: NaiveDate) -> Option<Timestamp> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        let exchange = FixedOffset::east_opt(EXCHANGE_UTC_OFFSET_SECS)?;
        return Some(dt.with_timezone(&exchange).naive_local());
    }

    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    {
        return Some(dt);
    }

    ["%H:%M:%S", "%H:%M"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(raw, fmt).ok())
        .map(|t| date.and_time(t))
}

/// Runs the standard health probe against `adapter`: fetch `date` and
/// require at least `min_rows` valid rows.
pub async fn probe_source<S: SourceAdapter + ?Sized>(
    adapter: &S,
    date: NaiveDate,
    min_rows: usize,
) -> SourceHealth {
    match adapter.fetch_validated(date).await {
        Ok(rows) if rows.len() >= min_rows => SourceHealth {
            name: adapter.name().to_string(),
            ok: true,
            row_count: rows.len(),
            error: None,
        },
        Ok(rows) => SourceHealth {
            name: adapter.name().to_string(),
            ok: false,
            row_count: rows.len(),
            error: Some(format!(
                "expected at least {min_rows} rows for {date}, got {}",
                rows.len()
            )),
        },
        Err(e) => SourceHealth {
            name: adapter.name().to_string(),
            ok: false,
            row_count: 0,
            error: Some(e.to_string()),
        },
    }
}
