//! Runtime configuration from environment variables (after `.env` loading).

use std::time::Duration;
use thiserror::Error;

use crate::settlement::DEFAULT_NOTIFY_TIMEOUT;
use crate::valuation::DEFAULT_CACHE_TTL;

/// Secret used when running without a database and without `JWT_SECRET`.
const DEV_JWT_SECRET: &str = "paper-exchange-dev-secret";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres URL. `None` runs against the in-memory ledger store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub bind_addr: String,
    pub jwt_secret: Vec<u8>,
    /// True when the dev secret was substituted for a missing `JWT_SECRET`.
    pub jwt_secret_is_default: bool,
    pub notifier_url: Option<String>,
    pub notifier_timeout: Duration,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    pub price_seed: Option<u64>,
    pub log_level: String,
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL");
        let (jwt_secret, jwt_secret_is_default) = match get("JWT_SECRET") {
            Some(secret) => (secret.into_bytes(), false),
            None if database_url.is_none() => (DEV_JWT_SECRET.as_bytes().to_vec(), true),
            None => return Err(ConfigError::Missing("JWT_SECRET")),
        };

        Ok(Self {
            database_url,
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", get("DB_MAX_CONNECTIONS"), 5)?,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            jwt_secret,
            jwt_secret_is_default,
            notifier_url: get("LEDGER_NOTIFIER_URL"),
            notifier_timeout: Duration::from_millis(parse_or(
                "NOTIFIER_TIMEOUT_MS",
                get("NOTIFIER_TIMEOUT_MS"),
                DEFAULT_NOTIFY_TIMEOUT.as_millis() as u64,
            )?),
            cache_enabled: !parse_or("DISABLE_CACHE", get("DISABLE_CACHE"), false)?,
            cache_ttl: Duration::from_secs(parse_or(
                "CACHE_TTL_SECS",
                get("CACHE_TTL_SECS"),
                DEFAULT_CACHE_TTL.as_secs(),
            )?),
            price_seed: get("PRICE_SEED")
                .map(|v| parse("PRICE_SEED", v))
                .transpose()?,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_json: parse_or("LOG_JSON", get("LOG_JSON"), false)?,
        })
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    value.map_or(Ok(default), |v| parse(key, v))
}
