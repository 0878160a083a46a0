use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Key/value configuration handed over by the host.
pub type Context = HashMap<String, String>;

/// Host context keys.
pub const BATCH_SIZE: &str = "batchSize";
pub const BATCH_DURATION_MS: &str = "batchDurationMillis";
pub const PAYLOAD_KEY: &str = "payloadKey";
pub const BACKOFF_SLEEP_INCREMENT: &str = "backoffSleepIncrement";
pub const MAX_BACKOFF_SLEEP: &str = "maxBackoffSleep";

const DEFAULT_BATCH_SIZE: usize = 1000;
const DEFAULT_BATCH_DURATION_MS: u64 = 1000;
const DEFAULT_PAYLOAD_KEY: &str = "body";
const DEFAULT_BACKOFF_SLEEP_INCREMENT_MS: u64 = 1000;
const DEFAULT_MAX_BACKOFF_SLEEP_MS: u64 = 5000;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse an optional context entry. Absent keys yield `None`.
fn context_value<T: FromStr>(ctx: &Context, key: &str) -> Result<Option<T>, ConfigError> {
    match ctx.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
            }),
    }
}

// ── Source config ─────────────────────────────────────────────

/// Settings for one pollable batching source.
///
/// Field names follow the host's camelCase keys so the same spelling works
/// in a context map and in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    /// Maximum number of events per dispatched batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum wall-clock window of one polling cycle, in milliseconds.
    #[serde(default = "default_batch_duration_ms", rename = "batchDurationMillis")]
    pub batch_duration_ms: u64,

    /// Message field holding the event payload.
    #[serde(default = "default_payload_key")]
    pub payload_key: String,

    /// Runner backoff step after each consecutive empty cycle, in milliseconds.
    #[serde(default = "default_backoff_increment", rename = "backoffSleepIncrement")]
    pub backoff_sleep_increment_ms: u64,

    /// Upper bound of the runner backoff sleep, in milliseconds.
    #[serde(default = "default_max_backoff", rename = "maxBackoffSleep")]
    pub max_backoff_sleep_ms: u64,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_batch_duration_ms() -> u64 {
    DEFAULT_BATCH_DURATION_MS
}

fn default_payload_key() -> String {
    DEFAULT_PAYLOAD_KEY.into()
}

fn default_backoff_increment() -> u64 {
    DEFAULT_BACKOFF_SLEEP_INCREMENT_MS
}

fn default_max_backoff() -> u64 {
    DEFAULT_MAX_BACKOFF_SLEEP_MS
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_duration_ms: default_batch_duration_ms(),
            payload_key: default_payload_key(),
            backoff_sleep_increment_ms: default_backoff_increment(),
            max_backoff_sleep_ms: default_max_backoff(),
        }
    }
}

impl SourceConfig {
    /// Build config from a host context. Missing keys take their defaults,
    /// unknown keys are ignored.
    pub fn from_context(ctx: &Context) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let cfg = Self {
            batch_size: context_value(ctx, BATCH_SIZE)?.unwrap_or(defaults.batch_size),
            batch_duration_ms: context_value(ctx, BATCH_DURATION_MS)?
                .unwrap_or(defaults.batch_duration_ms),
            payload_key: ctx
                .get(PAYLOAD_KEY)
                .map(|v| v.trim().to_string())
                .unwrap_or(defaults.payload_key),
            backoff_sleep_increment_ms: context_value(ctx, BACKOFF_SLEEP_INCREMENT)?
                .unwrap_or(defaults.backoff_sleep_increment_ms),
            max_backoff_sleep_ms: context_value(ctx, MAX_BACKOFF_SLEEP)?
                .unwrap_or(defaults.max_backoff_sleep_ms),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse config from a TOML string.
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load config from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `FLOWBATCH_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let profile = env_or("FLOWBATCH_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Result<Self, ConfigError> {
        let p = profile.to_uppercase();
        let p = p.as_str();
        let cfg = Self {
            batch_size: profiled_env_parse(p, "BATCH_SIZE", DEFAULT_BATCH_SIZE),
            batch_duration_ms: profiled_env_parse(
                p,
                "BATCH_DURATION_MS",
                DEFAULT_BATCH_DURATION_MS,
            ),
            payload_key: profiled_env_or(p, "PAYLOAD_KEY", DEFAULT_PAYLOAD_KEY),
            backoff_sleep_increment_ms: profiled_env_parse(
                p,
                "BACKOFF_SLEEP_INCREMENT_MS",
                DEFAULT_BACKOFF_SLEEP_INCREMENT_MS,
            ),
            max_backoff_sleep_ms: profiled_env_parse(
                p,
                "MAX_BACKOFF_SLEEP_MS",
                DEFAULT_MAX_BACKOFF_SLEEP_MS,
            ),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings the poller cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid(format!("{BATCH_SIZE} must be at least 1")));
        }
        if self.payload_key.is_empty() {
            return Err(ConfigError::Invalid(format!("{PAYLOAD_KEY} must not be empty")));
        }
        Ok(())
    }

    pub fn batch_duration(&self) -> Duration {
        Duration::from_millis(self.batch_duration_ms)
    }

    pub fn backoff_increment(&self) -> Duration {
        Duration::from_millis(self.backoff_sleep_increment_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_sleep_ms)
    }

    /// Log the effective settings for startup logs.
    pub fn log_summary(&self) {
        tracing::info!(
            batch_size = self.batch_size,
            batch_duration_ms = self.batch_duration_ms,
            payload_key = %self.payload_key,
            backoff_sleep_increment_ms = self.backoff_sleep_increment_ms,
            max_backoff_sleep_ms = self.max_backoff_sleep_ms,
            "source config"
        );
    }
}

// ── Tests ───────────────────────────────────────────────────────────
