//! JSON-over-HTTP implementation of the company data provider boundary.

use std::time::Duration;

use async_trait::async_trait;
use kabucal_core::{CompanyCode, CompanyDataProvider, Timestamp};
use serde::Deserialize;

use crate::error::SourceError;
use crate::sources::parse_source_datetime;

#[derive(Debug, Deserialize)]
struct CompanyProfile {
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    past_announcements: Vec<String>,
}

/// Answers `GET {base}/companies/{code}` with
/// `{"website": "...", "past_announcements": ["2025-11-07T13:30:00", ...]}`.
#[derive(Debug, Clone)]
pub struct HttpJsonProvider {
    base_url: String,
    client: reqwest::Client,
}

impl HttpJsonProvider {
    /// # Errors
    ///
    /// Returns [`SourceError::Fetch`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout_secs: u64, user_agent: &str) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn profile(&self, code: &CompanyCode) -> Option<CompanyProfile> {
        let url = format!("{}/companies/{}", self.base_url, code);
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(code = %code, error = %e, "company provider request failed");
                return None;
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(code = %code, "company unknown to provider");
            return None;
        }
        if !status.is_success() {
            tracing::warn!(code = %code, status = status.as_u16(), "company provider returned error status");
            return None;
        }

        match response.json::<CompanyProfile>().await {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!(code = %code, error = %e, "failed to decode company profile");
                None
            }
        }
    }
}

#[async_trait]
impl CompanyDataProvider for HttpJsonProvider {
    async fn website(&self, code: &CompanyCode) -> Option<String> {
        self.profile(code)
            .await?
            .website
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
    }

    async fn past_announcements(&self, code: &CompanyCode, limit: usize) -> Vec<Timestamp> {
        let Some(profile) = self.profile(code).await else {
            return Vec::new();
        };

        let mut past: Vec<Timestamp> = profile
            .past_announcements
            .iter()
            .filter_map(|raw| {
                // Bare times have no date to anchor to and are useless as history.
                let dt = parse_source_datetime(raw, chrono::NaiveDate::MIN)?;
                (dt.date() != chrono::NaiveDate::MIN).then_some(dt)
            })
            .collect();
        past.sort_unstable_by(|a, b| b.cmp(a));
        past.dedup();
        past.truncate(limit);
        past
    }
}
