//! Optional language-model capability used as the last resort by the
//! discovery cascade and the datetime parser.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use kabucal_core::{LlmSettings, Timestamp};
use serde_json::{json, Value};

use crate::error::LlmError;
use crate::html::truncate_chars;

const NOT_FOUND: &str = "NOT_FOUND";

const FIND_LINK_SYSTEM: &str = "You are an expert at finding links in HTML. \
Extract the URL that best matches the user's description. \
Return ONLY the URL, nothing else. If not found, return \"NOT_FOUND\".";

const EXTRACT_DATETIME_SYSTEM: &str = "You are an expert at extracting earnings announcement \
dates and times from Japanese company IR pages. Look for patterns like 決算発表日, 決算発表予定, \
業績発表, YYYY年MM月DD日 HH:MM, YYYY/MM/DD HH時MM分. \
Return the datetime in ISO format: YYYY-MM-DDTHH:MM:SS. \
If only a date is found, use T00:00:00. If not found, return \"NOT_FOUND\".";

/// Text-understanding oracle. Both operations answer `None` rather than
/// failing; callers treat `None` as "no signal".
#[async_trait]
pub trait LlmCapability: Send + Sync {
    /// URL of the link in `html` matching `description`. May be relative.
    async fn find_link(&self, html: &str, description: &str) -> Option<String>;

    /// Earnings announcement datetime mentioned in `html`.
    async fn extract_datetime(&self, html: &str, context: &str) -> Option<Timestamp>;
}

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct OpenAiCompatibleLlm {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    find_link_max_chars: usize,
    extract_max_chars: usize,
}

impl std::fmt::Debug for OpenAiCompatibleLlm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleLlm")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatibleLlm {
    /// # Errors
    ///
    /// Returns [`LlmError::Http`] if the HTTP client cannot be built.
    pub fn new(settings: &LlmSettings, timeout_secs: u64) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            find_link_max_chars: settings.find_link_max_chars,
            extract_max_chars: settings.extract_datetime_max_chars,
        })
    }

    /// Sends one chat-completion request and returns the first choice's
    /// message content.
    ///
    /// # Errors
    ///
    /// - [`LlmError::Http`]: network failure or undecodable body.
    /// - [`LlmError::Api`]: non-2xx status.
    /// - [`LlmError::Deserialize`]: no `choices[0].message.content`.
    pub async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt }
            ],
            "temperature": 0.1,
            "max_tokens": 256
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: truncate_chars(&body, 500).to_string(),
            });
        }

        let value: Value = response.json().await?;
        value
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| LlmError::Deserialize("missing choices[0].message.content".to_string()))
    }
}

#[async_trait]
impl LlmCapability for OpenAiCompatibleLlm {
    async fn find_link(&self, html: &str, description: &str) -> Option<String> {
        let excerpt = truncate_chars(html, self.find_link_max_chars);
        let prompt = format!(
            "Find the {description} link in this HTML:\n\n{excerpt}\n\n\
             Return only the URL (starting with http or /), or \"NOT_FOUND\" if not present."
        );

        match self.complete(FIND_LINK_SYSTEM, &prompt).await {
            Ok(content) => parse_link_response(&content),
            Err(e) => {
                tracing::warn!(error = %e, "LLM find_link failed");
                None
            }
        }
    }

    async fn extract_datetime(&self, html: &str, context: &str) -> Option<Timestamp> {
        let excerpt = truncate_chars(html, self.extract_max_chars);
        let context_line = if context.is_empty() {
            String::new()
        } else {
            format!("\nContext: {context}")
        };
        let prompt = format!(
            "Extract the earnings announcement datetime from this HTML:{context_line}\n\n{excerpt}\n\n\
             Return only the datetime in ISO format (YYYY-MM-DDTHH:MM:SS), or \"NOT_FOUND\"."
        );

        match self.complete(EXTRACT_DATETIME_SYSTEM, &prompt).await {
            Ok(content) => parse_datetime_response(&content),
            Err(e) => {
                tracing::warn!(error = %e, "LLM extract_datetime failed");
                None
            }
        }
    }
}

fn unquote(content: &str) -> &str {
    content
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
}

/// Accepts a bare URL or root-relative path; anything else is treated as
/// "not found".
pub(crate) fn parse_link_response(content: &str) -> Option<String> {
    let result = unquote(content);
    if result.is_empty() || result == NOT_FOUND {
        return None;
    }
    if result.starts_with("http") || result.starts_with('/') {
        Some(result.to_string())
    } else {
        None
    }
}

pub(crate) fn parse_datetime_response(content: &str) -> Option<Timestamp> {
    let result = unquote(content);
    if result.is_empty() || result == NOT_FOUND {
        return None;
    }

    let token = result.split_whitespace().collect::<Vec<_>>().join(" ");
    let token = token.trim_end_matches('Z');
    let token = token.get(..19).unwrap_or(token);

    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(token, fmt).ok())
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Wraps a capability with a process-wide token bucket. A call that cannot
/// get a permit within `max_wait` is skipped and answers `None`.
pub struct RateLimitedLlm<L> {
    inner: L,
    limiter: Arc<DirectLimiter>,
    max_wait: Duration,
}

impl<L> RateLimitedLlm<L> {
    pub fn new(inner: L, requests_per_minute: u32, max_wait: Duration) -> Self {
        let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            inner,
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(rpm))),
            max_wait,
        }
    }

    async fn permit(&self) -> bool {
        if tokio::time::timeout(self.max_wait, self.limiter.until_ready())
            .await
            .is_ok()
        {
            true
        } else {
            tracing::warn!(
                max_wait_ms = u64::try_from(self.max_wait.as_millis()).unwrap_or(u64::MAX),
                "LLM rate limit queue too long, skipping call"
            );
            false
        }
    }
}

#[async_trait]
impl<L: LlmCapability> LlmCapability for RateLimitedLlm<L> {
    async fn find_link(&self, html: &str, description: &str) -> Option<String> {
        if !self.permit().await {
            return None;
        }
        self.inner.find_link(html, description).await
    }

    async fn extract_datetime(&self, html: &str, context: &str) -> Option<Timestamp> {
        if !self.permit().await {
            return None;
        }
        self.inner.extract_datetime(html, context).await
    }
}

/// Builds the rate-limited OpenAI-compatible capability described by
/// `settings`.
///
/// # Errors
///
/// Returns [`LlmError::Http`] if the HTTP client cannot be built.
pub fn llm_from_settings(
    settings: &LlmSettings,
    timeout_secs: u64,
) -> Result<RateLimitedLlm<OpenAiCompatibleLlm>, LlmError> {
    let inner = OpenAiCompatibleLlm::new(settings, timeout_secs)?;
    Ok(RateLimitedLlm::new(
        inner,
        settings.requests_per_minute,
        settings.max_wait,
    ))
}
