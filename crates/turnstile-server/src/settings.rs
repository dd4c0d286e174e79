//! Server configuration.
//!
//! Layered with the `config` crate: an optional TOML file, overridden by
//! environment variables such as `TURNSTILE__SERVER__PORT=9090` or
//! `TURNSTILE__RATE_LIMIT__CAPACITY=500`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{CachePolicy, MokaCacheConfig};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Config file used when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "etc/turnstile.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    /// El archivo o las variables de entorno no se pudieron leer.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// Valores fuera de rango.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub store: StoreSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8888
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// TTL of cached users, in seconds.
    #[serde(default = "default_positive_ttl_secs")]
    pub positive_ttl_secs: u64,
    /// TTL of miss markers, in seconds. Must be shorter than `positive_ttl_secs`.
    #[serde(default = "default_negative_ttl_secs")]
    pub negative_ttl_secs: u64,
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

fn default_positive_ttl_secs() -> u64 {
    600
}
fn default_negative_ttl_secs() -> u64 {
    60
}
fn default_max_capacity() -> u64 {
    10_000
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            positive_ttl_secs: default_positive_ttl_secs(),
            negative_ttl_secs: default_negative_ttl_secs(),
            max_capacity: default_max_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Bucket size, i.e. the largest burst admitted at once.
    #[serde(default = "default_bucket_capacity")]
    pub capacity: u32,
    /// Tokens added per second.
    #[serde(default = "default_refill_per_sec")]
    pub refill_per_sec: f64,
}

fn default_bucket_capacity() -> u32 {
    100
}
fn default_refill_per_sec() -> f64 {
    100.0
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: default_bucket_capacity(),
            refill_per_sec: default_refill_per_sec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Deadline for a single store lookup, in milliseconds.
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_store_timeout_ms() -> u64 {
    2_000
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl Settings {
    /// Loads settings from `path` (or [`DEFAULT_CONFIG_PATH`]) and the
    /// process environment, then validates them.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        Self::load_with_env(path, None)
    }

    /// Like [`Settings::load`], reading overrides from `env` instead of the
    /// process environment when given.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, SettingsError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut builder = Config::builder();
        if path.exists() {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .separator("__")
                .source(env),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.server.port == 0 {
            return Err(SettingsError::Invalid("server.port must be > 0".into()));
        }
        if self.cache.negative_ttl_secs == 0 {
            return Err(SettingsError::Invalid(
                "cache.negative_ttl_secs must be > 0".into(),
            ));
        }
        if self.cache.negative_ttl_secs >= self.cache.positive_ttl_secs {
            return Err(SettingsError::Invalid(
                "cache.negative_ttl_secs must be < cache.positive_ttl_secs".into(),
            ));
        }
        if self.cache.max_capacity == 0 {
            return Err(SettingsError::Invalid(
                "cache.max_capacity must be > 0".into(),
            ));
        }
        if self.rate_limit.capacity == 0 {
            return Err(SettingsError::Invalid(
                "rate_limit.capacity must be >= 1".into(),
            ));
        }
        if !(self.rate_limit.refill_per_sec.is_finite() && self.rate_limit.refill_per_sec > 0.0) {
            return Err(SettingsError::Invalid(
                "rate_limit.refill_per_sec must be > 0".into(),
            ));
        }
        if self.store.timeout_ms == 0 {
            return Err(SettingsError::Invalid("store.timeout_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, SettingsError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| {
                SettingsError::Invalid(format!(
                    "server address {}:{} is not valid: {e}",
                    self.server.host, self.server.port
                ))
            })
    }

    pub fn cache_policy(&self) -> Result<CachePolicy, SettingsError> {
        CachePolicy::new(
            Duration::from_secs(self.cache.positive_ttl_secs),
            Duration::from_secs(self.cache.negative_ttl_secs),
        )
        .map(|policy| policy.with_store_timeout(Duration::from_millis(self.store.timeout_ms)))
        .map_err(|e| SettingsError::Invalid(e.to_string()))
    }

    pub fn moka_config(&self) -> MokaCacheConfig {
        MokaCacheConfig {
            max_capacity: self.cache.max_capacity,
        }
    }
}
