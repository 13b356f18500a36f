//! Application configuration, read once from the environment at startup.

use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_SIM_API_URL: &str = "https://api.sim.dune.com";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Upstream subscription and holder API.
    pub sim_api_key: String,
    pub sim_api_url: String,
    pub telegram_bot_token: String,
    /// Bot username, for commands addressed as `/status@name`.
    pub telegram_bot_username: String,
    /// Public base URL of this service, used for webhook callbacks.
    pub webhook_base_url: String,
    pub database_url: String,
    pub port: u16,
    pub tokens_csv: PathBuf,
    pub holders_per_token: usize,
    pub webhook_page_size: usize,
    pub webhook_max_pages: usize,
    /// Spacing between upstream API calls.
    pub upstream_delay_ms: u64,
    /// Spacing between Telegram sends.
    pub telegram_delay_ms: u64,
    pub http_timeout_secs: u64,
}

impl AppConfig {
    /// Build from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        Ok(Self {
            sim_api_key: required("SIM_API_KEY")?,
            telegram_bot_token: required("TELEGRAM_BOT_TOKEN")?,
            webhook_base_url: required("WEBHOOK_BASE_URL")?,
            database_url: required("DATABASE_URL")?,
            sim_api_url: get("SIM_API_URL").unwrap_or_else(|| DEFAULT_SIM_API_URL.to_string()),
            telegram_bot_username: get("TELEGRAM_BOT_USERNAME").unwrap_or_default(),
            port: parse_or(get("PORT"), "PORT", 3000)?,
            tokens_csv: get("TOKENS_CSV")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("tokens.csv")),
            holders_per_token: parse_or(get("HOLDERS_PER_TOKEN"), "HOLDERS_PER_TOKEN", 10)?,
            webhook_page_size: parse_or(get("WEBHOOK_PAGE_SIZE"), "WEBHOOK_PAGE_SIZE", 100)?,
            webhook_max_pages: parse_or(get("WEBHOOK_MAX_PAGES"), "WEBHOOK_MAX_PAGES", 50)?,
            upstream_delay_ms: parse_or(get("UPSTREAM_DELAY_MS"), "UPSTREAM_DELAY_MS", 200)?,
            telegram_delay_ms: parse_or(get("TELEGRAM_DELAY_MS"), "TELEGRAM_DELAY_MS", 50)?,
            http_timeout_secs: parse_or(get("HTTP_TIMEOUT_SECS"), "HTTP_TIMEOUT_SECS", 30)?,
        })
    }
}

fn parse_or<T: FromStr>(
    value: Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid { key, value: v }),
    }
}
