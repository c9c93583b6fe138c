use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub reply_poll_interval: Duration,
    pub reply_timeout: Duration,
    pub session_scan_interval: Duration,
    /// Slack on top of `reply_timeout` before a silent claim is taken back.
    pub session_lease_margin: Duration,
    pub max_concurrent_sessions: usize,
    pub store_retry_attempts: u32,
    pub store_retry_base: Duration,
    pub base_rubric_path: Option<PathBuf>,
    pub redflag_rubric_path: Option<PathBuf>,
    /// Transcript archival is enabled when set.
    pub archive: Option<ArchiveConfig>,
}

#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub s3_bucket: String,
    pub s3_endpoint: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let archive = optional_env("S3_BUCKET").map(|s3_bucket| ArchiveConfig {
            s3_bucket,
            s3_endpoint: optional_env("S3_ENDPOINT"),
            aws_access_key_id: optional_env("AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: optional_env("AWS_SECRET_ACCESS_KEY"),
        });

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            reply_poll_interval: Duration::from_secs(parse_env("REPLY_POLL_INTERVAL_SECS", 5)?),
            reply_timeout: Duration::from_secs(parse_env("REPLY_TIMEOUT_SECS", 600)?),
            session_scan_interval: Duration::from_secs(parse_env("SESSION_SCAN_INTERVAL_SECS", 5)?),
            session_lease_margin: Duration::from_secs(parse_env(
                "SESSION_LEASE_MARGIN_SECS",
                900,
            )?),
            max_concurrent_sessions: parse_env("MAX_CONCURRENT_SESSIONS", 8)?,
            store_retry_attempts: parse_env("STORE_RETRY_ATTEMPTS", 3)?,
            store_retry_base: Duration::from_millis(parse_env("STORE_RETRY_BASE_MS", 1000)?),
            base_rubric_path: optional_env("BASE_RUBRIC_PATH").map(PathBuf::from),
            redflag_rubric_path: optional_env("REDFLAG_RUBRIC_PATH").map(PathBuf::from),
            archive,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("{key} must be a valid {}", std::any::type_name::<T>()))
}
