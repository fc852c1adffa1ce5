use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use kabucal_core::{Clock, SourceConfig, SourceHealth};
use reqwest::Url;
use serde_json::Value;

use super::{next_weekday, parse_source_datetime, probe_source, RawObservation, SourceAdapter};
use crate::error::SourceError;

/// Generic adapter for a calendar service that answers
/// `GET {endpoint}?date=YYYY-MM-DD` with a JSON array of
/// `{code, name, datetime}` rows, or an object wrapping it in `entries`.
#[derive(Clone)]
pub struct HttpJsonSource {
    config: SourceConfig,
    endpoint: Url,
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for HttpJsonSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpJsonSource")
            .field("name", &self.config.name)
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpJsonSource {
    /// # Errors
    ///
    /// - [`SourceError::InvalidEndpoint`]: the configured endpoint does not parse.
    /// - [`SourceError::Fetch`]: the HTTP client cannot be built.
    pub fn new(
        config: SourceConfig,
        timeout_secs: u64,
        user_agent: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SourceError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| SourceError::InvalidEndpoint {
            endpoint: config.endpoint.clone(),
            reason: e.to_string(),
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            config,
            endpoint,
            client,
            clock,
        })
    }
}

#[async_trait]
impl SourceAdapter for HttpJsonSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn fetch(&self, date: NaiveDate) -> Result<Vec<RawObservation>, SourceError> {
        let day = date.format("%Y-%m-%d").to_string();
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("date", day.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::UnexpectedStatus {
                status: status.as_u16(),
                url: self.endpoint.to_string(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::Deserialize(e.to_string()))?;
        rows_from_payload(&body, date)
    }

    async fn health_check(&self) -> SourceHealth {
        let date = self
            .config
            .health_check
            .test_date
            .unwrap_or_else(|| next_weekday(self.clock.now().date()));
        probe_source(self, date, self.config.health_check.min_rows).await
    }
}

fn rows_from_payload(body: &Value, date: NaiveDate) -> Result<Vec<RawObservation>, SourceError> {
    let rows = match body {
        Value::Array(rows) => rows,
        Value::Object(map) => map
            .get("entries")
            .and_then(Value::as_array)
            .ok_or_else(|| SourceError::Deserialize("expected an `entries` array".to_string()))?,
        _ => {
            return Err(SourceError::Deserialize(
                "expected a JSON array or object".to_string(),
            ))
        }
    };

    Ok(rows.iter().filter_map(|row| row_from_value(row, date)).collect())
}

fn row_from_value(row: &Value, date: NaiveDate) -> Option<RawObservation> {
    let code = match row.get("code")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let name = row
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();
    let datetime = row
        .get("datetime")
        .and_then(Value::as_str)
        .and_then(|raw| parse_source_datetime(raw, date));

    Some(RawObservation {
        code,
        name,
        datetime,
    })
}
