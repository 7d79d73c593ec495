//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (MEDCACHE_*)
//! 2. TOML config file (if MEDCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::PoolNamespace;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (MEDCACHE_*)
/// 2. TOML config file (if MEDCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite database holding the cache pools.
    ///
    /// Set via MEDCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin of the site being served. Only requests to this origin are
    /// intercepted; relative URLs resolve against it.
    ///
    /// Set via MEDCACHE_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Namespace prefix shared by every pool this engine owns.
    ///
    /// Set via MEDCACHE_CACHE_PREFIX environment variable.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Version tag of the current deployment. Pools carrying any other
    /// version under the same prefix are deleted on activate.
    ///
    /// Set via MEDCACHE_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via MEDCACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via MEDCACHE_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via MEDCACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Bounded wait for network-first requests before falling back to cache.
    ///
    /// Set via MEDCACHE_API_TIMEOUT_MS environment variable.
    #[serde(default = "default_api_timeout_ms")]
    pub api_timeout_ms: u64,

    /// Treat entries older than their class max-age hint as expired.
    ///
    /// Set via MEDCACHE_ENFORCE_MAX_AGE environment variable.
    #[serde(default)]
    pub enforce_max_age: bool,

    /// Emergency number shown in fallback content.
    ///
    /// Set via MEDCACHE_EMERGENCY_NUMBER environment variable.
    #[serde(default = "default_emergency_number")]
    pub emergency_number: String,

    /// Non-emergency medical on-call number shown in fallback content.
    ///
    /// Set via MEDCACHE_ON_CALL_NUMBER environment variable.
    #[serde(default = "default_on_call_number")]
    pub on_call_number: String,

    /// Run install and activate when the host starts.
    ///
    /// Set via MEDCACHE_INSTALL_ON_START environment variable.
    #[serde(default = "default_true")]
    pub install_on_start: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./medcache.sqlite")
}

fn default_origin() -> String {
    "http://localhost:3000".into()
}

fn default_cache_prefix() -> String {
    "healthcare".into()
}

fn default_cache_version() -> String {
    "v1".into()
}

fn default_user_agent() -> String {
    "medcache/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_api_timeout_ms() -> u64 {
    5_000
}

fn default_emergency_number() -> String {
    "112".into()
}

fn default_on_call_number() -> String {
    "116 117".into()
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            cache_prefix: default_cache_prefix(),
            cache_version: default_cache_version(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            api_timeout_ms: default_api_timeout_ms(),
            enforce_max_age: false,
            emergency_number: default_emergency_number(),
            on_call_number: default_on_call_number(),
            install_on_start: true,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Bounded wait for network-first requests.
    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }

    /// Pool names derived from the configured prefix and version.
    pub fn namespace(&self) -> PoolNamespace {
        PoolNamespace::new(&self.cache_prefix, &self.cache_version)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `MEDCACHE_`
    /// 2. TOML file from `MEDCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("MEDCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("MEDCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
