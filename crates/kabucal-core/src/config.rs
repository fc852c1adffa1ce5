use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;

use crate::app_config::{AppConfig, LlmSettings};
use crate::ConfigError;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so tests can drive it with a
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_time = |var: &str, default: &str| -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(&or_default(var, default), "%H:%M")
            .map_err(|e| invalid(var, format!("expected HH:MM: {e}")))
    };

    let log_level = or_default("KABUCAL_LOG_LEVEL", "info");
    let sources_path = PathBuf::from(or_default("KABUCAL_SOURCES_PATH", "./config/sources.yaml"));
    let cache_path = PathBuf::from(or_default("KABUCAL_CACHE_PATH", "./.kabucal/ir_cache.json"));
    let cache_ttl_days = parse_u32("KABUCAL_CACHE_TTL_DAYS", "30")?;

    let max_workers = parse_usize("KABUCAL_MAX_WORKERS", "5")?;
    if max_workers == 0 {
        return Err(invalid("KABUCAL_MAX_WORKERS", "must be at least 1".to_string()));
    }

    let request_timeout_secs = parse_u64("KABUCAL_REQUEST_TIMEOUT_SECS", "30")?;
    let source_timeout_secs = parse_u64("KABUCAL_SOURCE_TIMEOUT_SECS", "60")?;
    let ir_timeout_secs = parse_u64("KABUCAL_IR_TIMEOUT_SECS", "30")?;
    let user_agent = or_default("KABUCAL_USER_AGENT", DEFAULT_USER_AGENT);

    let market_close = parse_time("KABUCAL_MARKET_CLOSE", "15:30")?;
    let date_only_time = parse_time("KABUCAL_DATE_ONLY_TIME", "15:30")?;
    let match_tolerance_minutes = parse_u32("KABUCAL_MATCH_TOLERANCE_MINUTES", "0")?;
    let history_limit = parse_usize("KABUCAL_HISTORY_LIMIT", "8")?;

    let provider_url = lookup("KABUCAL_PROVIDER_URL")
        .ok()
        .filter(|v| !v.trim().is_empty());

    let llm = match lookup("KABUCAL_LLM_API_KEY").ok().filter(|v| !v.trim().is_empty()) {
        Some(api_key) => Some(LlmSettings {
            api_key,
            base_url: or_default("KABUCAL_LLM_BASE_URL", "https://api.openai.com/v1"),
            model: or_default("KABUCAL_LLM_MODEL", "gpt-4o-mini"),
            requests_per_minute: parse_u32("KABUCAL_LLM_RPM", "15")?,
            max_wait: Duration::from_secs(parse_u64("KABUCAL_LLM_MAX_WAIT_SECS", "10")?),
            find_link_max_chars: parse_usize("KABUCAL_LLM_FIND_LINK_MAX_CHARS", "50000")?,
            extract_datetime_max_chars: parse_usize("KABUCAL_LLM_EXTRACT_MAX_CHARS", "12000")?,
        }),
        None => None,
    };

    Ok(AppConfig {
        log_level,
        sources_path,
        cache_path,
        cache_ttl_days,
        max_workers,
        request_timeout_secs,
        source_timeout_secs,
        ir_timeout_secs,
        user_agent,
        market_close,
        date_only_time,
        match_tolerance_minutes,
        history_limit,
        provider_url,
        llm,
    })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
