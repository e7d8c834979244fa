//! Server configuration from `DISCOVERY_*` environment variables
//!
//! | Variable                          | Default   |
//! |-----------------------------------|-----------|
//! | `DISCOVERY_PORT`                  | `8080`    |
//! | `DISCOVERY_BIND`                  | `0.0.0.0` |
//! | `DISCOVERY_LOG_LEVEL`             | `info`    |
//! | `DISCOVERY_STORE`                 | `memory`  |
//! | `DISCOVERY_DATABASE_URL`          | required for `postgres` |
//! | `DISCOVERY_DISABLE_SIG_VERIFY`    | `false`   |
//! | `DISCOVERY_REQUEST_TIMEOUT_SECS`  | `30` (1 to 86400) |
//! | `DISCOVERY_POLL_INTERVAL_MS`      | `1000` (1 to 60000) |
//! | `DISCOVERY_REAP_AFTER_SECS`       | unset or `0` (no reaper) |

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::Level;

use crate::api::handlers::ApiConfig;

/// Accepted `DISCOVERY_REQUEST_TIMEOUT_SECS` values (up to one day)
pub const REQUEST_TIMEOUT_SECS_RANGE: RangeInclusive<u64> = 1..=86_400;

/// Accepted `DISCOVERY_POLL_INTERVAL_MS` values (up to one minute)
pub const POLL_INTERVAL_MS_RANGE: RangeInclusive<u64> = 1..=60_000;

/// Accepted `DISCOVERY_REAP_AFTER_SECS` values; 0 disables the reaper
pub const REAP_AFTER_SECS_RANGE: RangeInclusive<u64> = 0..=31_536_000;

/// Invalid or incomplete configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Unsupported configuration: {0}")]
    Unsupported(String),
}

/// Which registry backend to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Ephemeral registry, no rendezvous
    Memory,
    /// Rendezvous registry over the in-process ledger
    Ledger,
    /// Rendezvous registry over PostgreSQL
    Postgres,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "ledger" => Ok(StoreKind::Ledger),
            "postgres" => Ok(StoreKind::Postgres),
            other => Err(format!("unknown store '{}' (memory, ledger, postgres)", other)),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreKind::Memory => "memory",
            StoreKind::Ledger => "ledger",
            StoreKind::Postgres => "postgres",
        })
    }
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub log_level: Level,
    pub store: StoreKind,
    pub database_url: Option<String>,
    pub verify_signatures: bool,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    /// Age after which unconverged transports are reaped
    pub reap_after: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            log_level: Level::INFO,
            store: StoreKind::Memory,
            database_url: None,
            verify_signatures: true,
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(1000),
            reap_after: None,
        }
    }
}

fn parse_var<T>(var: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match raw {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            }),
    }
}

/// Reject a parsed value outside `range`
fn bounded(
    var: &'static str,
    value: Option<u64>,
    range: RangeInclusive<u64>,
) -> Result<Option<u64>, ConfigError> {
    match value {
        Some(v) if !range.contains(&v) => Err(ConfigError::Invalid {
            var,
            value: v.to_string(),
            reason: format!("must be between {} and {}", range.start(), range.end()),
        }),
        _ => Ok(value),
    }
}

fn parse_bool(var: &'static str, raw: Option<String>) -> Result<Option<bool>, ConfigError> {
    let Some(value) = raw else {
        return Ok(None);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::Invalid {
            var,
            value,
            reason: "expected true or false".into(),
        }),
    }
}

impl ServerConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let store = parse_var("DISCOVERY_STORE", lookup("DISCOVERY_STORE"))?
            .unwrap_or(defaults.store);
        let database_url = lookup("DISCOVERY_DATABASE_URL").filter(|url| !url.trim().is_empty());

        if store == StoreKind::Postgres {
            if database_url.is_none() {
                return Err(ConfigError::Missing("DISCOVERY_DATABASE_URL"));
            }
            if !cfg!(feature = "postgres") {
                return Err(ConfigError::Unsupported(
                    "DISCOVERY_STORE=postgres needs a build with the `postgres` feature".into(),
                ));
            }
        }

        let request_timeout_secs = bounded(
            "DISCOVERY_REQUEST_TIMEOUT_SECS",
            parse_var(
                "DISCOVERY_REQUEST_TIMEOUT_SECS",
                lookup("DISCOVERY_REQUEST_TIMEOUT_SECS"),
            )?,
            REQUEST_TIMEOUT_SECS_RANGE,
        )?;
        let poll_interval_ms = bounded(
            "DISCOVERY_POLL_INTERVAL_MS",
            parse_var("DISCOVERY_POLL_INTERVAL_MS", lookup("DISCOVERY_POLL_INTERVAL_MS"))?,
            POLL_INTERVAL_MS_RANGE,
        )?;
        let reap_after_secs = bounded(
            "DISCOVERY_REAP_AFTER_SECS",
            parse_var("DISCOVERY_REAP_AFTER_SECS", lookup("DISCOVERY_REAP_AFTER_SECS"))?,
            REAP_AFTER_SECS_RANGE,
        )?;

        let disable_verify =
            parse_bool("DISCOVERY_DISABLE_SIG_VERIFY", lookup("DISCOVERY_DISABLE_SIG_VERIFY"))?
                .unwrap_or(false);

        Ok(Self {
            bind: lookup("DISCOVERY_BIND")
                .filter(|b| !b.trim().is_empty())
                .unwrap_or(defaults.bind),
            port: parse_var("DISCOVERY_PORT", lookup("DISCOVERY_PORT"))?.unwrap_or(defaults.port),
            log_level: parse_var("DISCOVERY_LOG_LEVEL", lookup("DISCOVERY_LOG_LEVEL"))?
                .unwrap_or(defaults.log_level),
            store,
            database_url,
            verify_signatures: !disable_verify,
            request_timeout: request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            poll_interval: poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            reap_after: reap_after_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        })
    }

    /// Socket address to listen on
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            request_timeout: self.request_timeout,
        }
    }
}
