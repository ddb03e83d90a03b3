//! Process-wide configuration (C17), loaded once from the environment and
//! passed explicitly to services rather than read ad hoc.

use std::collections::HashSet;

use thiserror::Error;
use tracing::Level;

/// Configuration failures reported at process startup, before any service
/// is constructed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be 'true' or 'false', got '{1}'")]
    InvalidBool(&'static str, String),
    #[error("{0} must be a positive integer, got '{1}'")]
    InvalidInt(&'static str, String),
    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Application-wide configuration. `DATABASE_URL` is owned by `lifeplan-state`,
/// not this struct — persistence wiring lives there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub app_base_url: String,
    pub email_from_address: String,
    pub email_from_name: String,
    pub brevo_api_key: String,
    pub brevo_base_url: String,
    pub email_dry_run: bool,
    pub allowed_recipient_domains: HashSet<String>,
    pub notification_token_secret: String,
    pub cors_origins: Vec<String>,
    pub auto_create_schema: bool,
    pub log_format_json: bool,
    pub log_level: Level,
    pub scan_interval_secs: u64,
    pub dispatch_interval_secs: u64,
    pub outbox_batch_size: u32,
}

impl AppConfig {
    /// Load and validate configuration from the process environment.
    ///
    /// Fails fast on malformed `EMAIL_DRY_RUN`, `AUTO_CREATE_SCHEMA`, interval
    /// or batch-size values, and on a missing `NOTIFICATION_TOKEN_SECRET`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let allowed_recipient_domains = std::env::var("EMAIL_ALLOWED_RECIPIENT_DOMAINS")
            .unwrap_or_default()
            .split(',')
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();

        let cors_origins = std::env::var("CORS_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        let notification_token_secret = std::env::var("NOTIFICATION_TOKEN_SECRET")
            .map_err(|_| ConfigError::Missing("NOTIFICATION_TOKEN_SECRET"))?;
        if notification_token_secret.is_empty() {
            return Err(ConfigError::Missing("NOTIFICATION_TOKEN_SECRET"));
        }

        Ok(Self {
            app_base_url: env_or("APP_BASE_URL", "http://localhost:3000"),
            email_from_address: env_or("EMAIL_FROM_ADDRESS", "noreply@example.com"),
            email_from_name: env_or("EMAIL_FROM_NAME", "Life Event"),
            brevo_api_key: env_or("BREVO_API_KEY", ""),
            brevo_base_url: env_or("BREVO_BASE_URL", "https://api.brevo.com/v3"),
            email_dry_run: parse_bool("EMAIL_DRY_RUN", true)?,
            allowed_recipient_domains,
            notification_token_secret,
            cors_origins,
            auto_create_schema: parse_bool("AUTO_CREATE_SCHEMA", true)?,
            log_format_json: env_or("LOG_FORMAT", "text") == "json",
            log_level: parse_level("LOG_LEVEL", Level::INFO),
            scan_interval_secs: parse_u64("SCAN_INTERVAL_SECS", 300)?,
            dispatch_interval_secs: parse_u64("DISPATCH_INTERVAL_SECS", 30)?,
            outbox_batch_size: parse_u32("OUTBOX_BATCH_SIZE", 50)?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.to_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(ConfigError::InvalidBool(key, raw)),
        },
    }
}

fn parse_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidInt(key, raw)),
    }
}

fn parse_u32(key: &'static str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidInt(key, raw)),
    }
}

fn parse_level(key: &str, default: Level) -> Level {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse::<Level>().ok())
        .unwrap_or(default)
}
