//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use checkout::{CheckoutConfig, TotalsPolicy};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `text` or `json` (default: `text`)
/// - `DATABASE_URL` — PostgreSQL URL; the in-memory store is used when unset
/// - `DATABASE_MAX_CONNECTIONS` — pool size (default: `10`)
/// - `CHECKOUT_MAX_ATTEMPTS` — attempts per write-conflicted operation (default: `3`)
/// - `CHECKOUT_RETRY_BACKOFF_MS` — base retry delay (default: `10`)
/// - `CHECKOUT_ATTEMPT_TIMEOUT_MS` — per-attempt timeout; unset means none
/// - `CHECKOUT_TOTALS_POLICY` — `flag` or `reject` (default: `flag`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub attempt_timeout_ms: Option<u64>,
    pub totals_policy: TotalsPolicy,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let lookup = &lookup;

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            database_max_connections: parse_var(lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            max_attempts: parse_var(lookup, "CHECKOUT_MAX_ATTEMPTS")
                .unwrap_or(defaults.max_attempts),
            retry_backoff_ms: parse_var(lookup, "CHECKOUT_RETRY_BACKOFF_MS")
                .unwrap_or(defaults.retry_backoff_ms),
            attempt_timeout_ms: parse_var(lookup, "CHECKOUT_ATTEMPT_TIMEOUT_MS"),
            totals_policy: lookup("CHECKOUT_TOTALS_POLICY")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.totals_policy),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the coordinator settings.
    pub fn checkout_config(&self) -> CheckoutConfig {
        CheckoutConfig::default()
            .with_max_attempts(self.max_attempts)
            .with_retry_backoff(Duration::from_millis(self.retry_backoff_ms))
            .with_attempt_timeout(self.attempt_timeout_ms.map(Duration::from_millis))
            .with_totals_policy(self.totals_policy)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            max_attempts: 3,
            retry_backoff_ms: 10,
            attempt_timeout_ms: None,
            totals_policy: TotalsPolicy::Flag,
        }
    }
}
