//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use common::{Secret, UserId};
use domain::{Currency, Principal, Role};
use thiserror::Error;

/// A configuration value that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(name: &'static str, reason: impl std::fmt::Display) -> Self {
        ConfigError::Invalid {
            name,
            reason: reason.to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected `pretty` or `json`, got `{other}`")),
        }
    }
}

/// Credentials for the hosted payment gateway.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub url: String,
    pub key_id: String,
    pub key_secret: Secret<String>,
}

/// A bearer token and the principal it authenticates.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub token: Secret<String>,
    pub principal: Principal,
}

/// Server configuration.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `pretty` or `json`
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on the in-memory store
/// - `DATABASE_MAX_CONNECTIONS` (default 10)
/// - `PAYMENT_WEBHOOK_SECRET`: HMAC key for payment callbacks (required)
/// - `PAYMENT_GATEWAY_URL`, `PAYMENT_GATEWAY_KEY_ID`,
///   `PAYMENT_GATEWAY_KEY_SECRET`: hosted gateway; unset uses the sandbox
/// - `PAYMENT_GATEWAY_TIMEOUT_MS` (default 10000)
/// - `CURRENCY` (default `INR`)
/// - `ORDER_TTL_SECS` (default 1800), `EXPIRY_SWEEP_INTERVAL_SECS` (default 60)
/// - `API_TOKENS`: comma-separated `token:user-uuid:role` entries
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<Secret<String>>,
    pub database_max_connections: u32,
    pub webhook_secret: Secret<String>,
    pub gateway: Option<GatewaySettings>,
    pub gateway_timeout: Duration,
    pub currency: Currency,
    pub order_ttl: Duration,
    pub expiry_sweep_interval: Duration,
    pub api_tokens: Vec<TokenGrant>,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, applying defaults for unset
    /// values. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let gateway = match var("PAYMENT_GATEWAY_URL") {
            Some(url) => Some(GatewaySettings {
                url,
                key_id: var("PAYMENT_GATEWAY_KEY_ID")
                    .ok_or(ConfigError::Missing("PAYMENT_GATEWAY_KEY_ID"))?,
                key_secret: var("PAYMENT_GATEWAY_KEY_SECRET")
                    .map(Secret::new)
                    .ok_or(ConfigError::Missing("PAYMENT_GATEWAY_KEY_SECRET"))?,
            }),
            None => None,
        };

        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parse(&var, "PORT")?.unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parse(&var, "LOG_FORMAT")?.unwrap_or(defaults.log_format),
            database_url: var("DATABASE_URL").map(Secret::new),
            database_max_connections: parse(&var, "DATABASE_MAX_CONNECTIONS")?
                .unwrap_or(defaults.database_max_connections),
            webhook_secret: var("PAYMENT_WEBHOOK_SECRET")
                .map(Secret::new)
                .ok_or(ConfigError::Missing("PAYMENT_WEBHOOK_SECRET"))?,
            gateway,
            gateway_timeout: parse(&var, "PAYMENT_GATEWAY_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.gateway_timeout),
            currency: parse(&var, "CURRENCY")?.unwrap_or(defaults.currency),
            order_ttl: parse(&var, "ORDER_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.order_ttl),
            expiry_sweep_interval: positive_secs(&var, "EXPIRY_SWEEP_INTERVAL_SECS")?
                .unwrap_or(defaults.expiry_sweep_interval),
            api_tokens: match var("API_TOKENS") {
                Some(raw) => parse_tokens(&raw)?,
                None => Vec::new(),
            },
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            database_max_connections: 10,
            webhook_secret: Secret::default(),
            gateway: None,
            gateway_timeout: Duration::from_millis(10_000),
            currency: Currency::Inr,
            order_ttl: Duration::from_secs(1800),
            expiry_sweep_interval: Duration::from_secs(60),
            api_tokens: Vec::new(),
        }
    }
}

fn parse<T, V>(var: &V, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    var(name)
        .map(|raw| raw.trim().parse::<T>())
        .transpose()
        .map_err(|e| ConfigError::invalid(name, e))
}

fn positive_secs<V>(var: &V, name: &'static str) -> Result<Option<Duration>, ConfigError>
where
    V: Fn(&str) -> Option<String>,
{
    match parse::<u64, V>(var, name)? {
        Some(0) => Err(ConfigError::invalid(name, "must be greater than 0")),
        other => Ok(other.map(Duration::from_secs)),
    }
}

/// Parses `token:user-uuid:role` entries separated by commas.
fn parse_tokens(raw: &str) -> Result<Vec<TokenGrant>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(3, ':');
            let (Some(token), Some(user), Some(role)) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(ConfigError::invalid(
                    "API_TOKENS",
                    "entries must look like token:user-uuid:role",
                ));
            };
            if token.is_empty() {
                return Err(ConfigError::invalid("API_TOKENS", "empty token"));
            }
            let id = user
                .parse::<UserId>()
                .map_err(|e| ConfigError::invalid("API_TOKENS", e))?;
            let role = role
                .parse::<Role>()
                .map_err(|e| ConfigError::invalid("API_TOKENS", e))?;
            Ok(TokenGrant {
                token: Secret::new(token.to_string()),
                principal: Principal::new(id, role),
            })
        })
        .collect()
}
