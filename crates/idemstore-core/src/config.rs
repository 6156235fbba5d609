//! Configuration for the store and the guard.
//!
//! Defaults match the reference behavior: pending claims never time out and
//! results are cached for 24 hours. `from_env` reads:
//!
//! | variable                         | meaning                          |
//! |----------------------------------|----------------------------------|
//! | `IDEMSTORE_PENDING_TIMEOUT_SECS` | stale pending claim timeout      |
//! | `IDEMSTORE_SWEEP_INTERVAL_SECS`  | background expiry sweep interval |
//! | `IDEMSTORE_TTL_SECS`             | ttl for completed results        |
//! | `IDEMSTORE_ENFORCE_UUID4`        | require v4 UUID keys in guard    |
//!
//! `0` disables a duration.

use std::env;
use std::time::Duration;

use thiserror::Error;

pub const ENV_PENDING_TIMEOUT: &str = "IDEMSTORE_PENDING_TIMEOUT_SECS";
pub const ENV_SWEEP_INTERVAL: &str = "IDEMSTORE_SWEEP_INTERVAL_SECS";
pub const ENV_TTL: &str = "IDEMSTORE_TTL_SECS";
pub const ENV_ENFORCE_UUID4: &str = "IDEMSTORE_ENFORCE_UUID4";

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60 * 24);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// Store-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Pending claims older than this are treated as absent. `None` keeps them forever.
    pub pending_timeout: Option<Duration>,

    /// Interval of the background expiry sweep. `None` disables the sweep.
    pub sweep_interval: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            pending_timeout: None,
            sweep_interval: Some(DEFAULT_SWEEP_INTERVAL),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn with_pending_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pending_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    pub fn with_sweep_interval(mut self, interval: Option<Duration>) -> Self {
        self.sweep_interval = interval.filter(|i| !i.is_zero());
        self
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(secs) = parse_secs(&lookup, ENV_PENDING_TIMEOUT)? {
            config = config.with_pending_timeout(Some(secs));
        }
        if let Some(secs) = parse_secs(&lookup, ENV_SWEEP_INTERVAL)? {
            config = config.with_sweep_interval(Some(secs));
        }
        Ok(config)
    }
}

/// Settings for [`crate::app::IdempotencyGuard`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    /// Ttl passed to `complete`. `None` caches results forever.
    pub ttl: Option<Duration>,

    /// Reject keys that are not v4 UUIDs before touching the store.
    pub enforce_uuid4: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            ttl: Some(DEFAULT_TTL),
            enforce_uuid4: false,
        }
    }
}

impl GuardConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl.filter(|t| !t.is_zero());
        self
    }

    pub fn with_enforce_uuid4(mut self, enforce: bool) -> Self {
        self.enforce_uuid4 = enforce;
        self
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(ttl) = parse_secs(&lookup, ENV_TTL)? {
            config = config.with_ttl(Some(ttl));
        }
        if let Some(raw) = lookup(ENV_ENFORCE_UUID4) {
            config.enforce_uuid4 = parse_bool(ENV_ENFORCE_UUID4, &raw)?;
        }
        Ok(config)
    }
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(|secs| Some(Duration::from_secs(secs)))
        .map_err(|_| ConfigError::Invalid { var, value: raw })
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw.to_string(),
        }),
    }
}
