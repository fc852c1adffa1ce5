use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;

use crate::session::TradingSessions;

/// Settings for the optional OpenAI-compatible LLM capability. Present only
/// when an API key is configured.
#[derive(Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub requests_per_minute: u32,
    pub max_wait: Duration,
    pub find_link_max_chars: usize,
    pub extract_datetime_max_chars: usize,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("api_key", &"[redacted]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("requests_per_minute", &self.requests_per_minute)
            .field("max_wait", &self.max_wait)
            .field("find_link_max_chars", &self.find_link_max_chars)
            .field(
                "extract_datetime_max_chars",
                &self.extract_datetime_max_chars,
            )
            .finish()
    }
}

/// Process configuration, built once and handed to the resolver, cascade,
/// and cache constructors.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub sources_path: PathBuf,
    pub cache_path: PathBuf,
    pub cache_ttl_days: u32,
    pub max_workers: usize,
    pub request_timeout_secs: u64,
    pub source_timeout_secs: u64,
    pub ir_timeout_secs: u64,
    pub user_agent: String,
    pub market_close: NaiveTime,
    pub date_only_time: NaiveTime,
    pub match_tolerance_minutes: u32,
    pub history_limit: usize,
    pub provider_url: Option<String>,
    pub llm: Option<LlmSettings>,
}

impl AppConfig {
    #[must_use]
    pub fn sessions(&self) -> TradingSessions {
        TradingSessions::with_close(self.market_close)
    }

    #[must_use]
    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    #[must_use]
    pub fn ir_timeout(&self) -> Duration {
        Duration::from_secs(self.ir_timeout_secs)
    }
}
