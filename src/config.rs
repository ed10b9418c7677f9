use chrono_tz::Tz;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::storage::{repository, Database};

pub const KEY_ENABLED_METRICS: &str = "enabled_metrics";
pub const KEY_TIMEZONE: &str = "timezone";
pub const KEY_DEFAULT_USER: &str = "default_user";
pub const KEY_LLM_PROVIDER: &str = "llm_provider";
pub const KEY_LLM_MODEL: &str = "llm_model";
pub const KEY_LLM_TIMEOUT_SECS: &str = "llm_timeout_secs";

/// LLM backend configuration.
#[derive(Debug, Clone, Serialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "bedrock".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Application configuration assembled from the `app_config` table.
///
/// Read once at startup; changing `enabled_metrics` or `timezone` takes
/// effect on the next process start.
#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    /// Enabled metric names, in dashboard display order.
    pub enabled_metrics: Vec<String>,
    /// IANA zone used to resolve entry timestamps to calendar days.
    pub timezone: Tz,
    /// User assumed when no user is named explicitly.
    pub default_user: String,
    pub llm: LlmConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            enabled_metrics: vec![
                "weight".to_string(),
                "mood".to_string(),
                "exercise".to_string(),
                "sleep".to_string(),
                "alone_time".to_string(),
                "notes".to_string(),
            ],
            timezone: Tz::UTC,
            default_user: "me".to_string(),
            llm: LlmConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the database, filling gaps with defaults.
    /// An unparseable timezone or timeout is a configuration error rather
    /// than a silent fallback.
    pub async fn load(db: &Database) -> Result<Self> {
        let keys = db
            .reader()
            .call(|conn| {
                let enabled = repository::get_config(conn, KEY_ENABLED_METRICS)?;
                let timezone = repository::get_config(conn, KEY_TIMEZONE)?;
                let default_user = repository::get_config(conn, KEY_DEFAULT_USER)?;
                let provider = repository::get_config(conn, KEY_LLM_PROVIDER)?;
                let model = repository::get_config(conn, KEY_LLM_MODEL)?;
                let timeout = repository::get_config(conn, KEY_LLM_TIMEOUT_SECS)?;
                Ok::<[Option<String>; 6], rusqlite::Error>([
                    enabled,
                    timezone,
                    default_user,
                    provider,
                    model,
                    timeout,
                ])
            })
            .await?;
        let [enabled, timezone, default_user, provider, model, timeout] = keys;

        let mut config = AppConfig::default();
        if let Some(enabled) = enabled {
            config.enabled_metrics = parse_metric_list(&enabled);
        }
        if let Some(zone) = timezone {
            config.timezone = zone
                .parse::<Tz>()
                .map_err(|_| Error::Config(format!("invalid timezone: {zone}")))?;
        }
        if let Some(user) = default_user {
            config.default_user = user;
        }
        if let Some(provider) = provider {
            config.llm.provider = provider;
        }
        if let Some(model) = model {
            config.llm.model = model;
        }
        if let Some(timeout) = timeout {
            config.llm.timeout_secs = timeout
                .parse()
                .map_err(|_| Error::Config(format!("invalid llm_timeout_secs: {timeout}")))?;
        }
        Ok(config)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled_metrics.iter().any(|n| n == name)
    }
}

/// Parse a comma-separated metric list, preserving order and dropping blanks.
fn parse_metric_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
