//! HTTP access for IR discovery and parsing.

use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::error::FetchError;

/// HTTP client owned by one worker. Never shared between concurrent units,
/// so connection state cannot leak across companies.
///
/// 404 and other non-2xx responses surface as typed errors. No retries:
/// a repeat run is the retry mechanism.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    /// Creates a `PageFetcher` with configured timeout and `User-Agent`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed (e.g., invalid TLS config).
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    /// Fetches `url` and returns the decoded body.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`]: `url` does not parse.
    /// - [`FetchError::NotFound`]: HTTP 404.
    /// - [`FetchError::UnexpectedStatus`]: any other non-2xx status.
    /// - [`FetchError::Http`]: network or TLS failure.
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        tracing::debug!(url, "fetching page");
        let response = self
            .client
            .get(parsed)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "ja,en-US;q=0.8,en;q=0.6")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }

    /// Checks that `url` resolves, following redirects. Returns the final
    /// URL on success.
    ///
    /// A HEAD probe is tried first; servers that block HEAD with 403 or 405
    /// get a GET retry whose body is discarded.
    pub async fn probe(&self, url: &str) -> Option<String> {
        let head = match self.client.head(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::debug!(url, error = %e, "HEAD probe failed");
                return None;
            }
        };

        let status = head.status();
        if status.is_success() {
            return Some(head.url().to_string());
        }

        if status == StatusCode::FORBIDDEN || status == StatusCode::METHOD_NOT_ALLOWED {
            match self.client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => return Some(resp.url().to_string()),
                Ok(resp) => {
                    tracing::debug!(url, status = resp.status().as_u16(), "GET probe rejected");
                }
                Err(e) => {
                    tracing::debug!(url, error = %e, "GET probe failed");
                }
            }
            return None;
        }

        tracing::debug!(url, status = status.as_u16(), "probe rejected");
        None
    }
}
