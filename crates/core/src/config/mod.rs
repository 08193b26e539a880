//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (TABCACHE_*)
//! 2. TOML config file (if TABCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::StoreConfig;

mod validation;

pub use validation::ConfigError;

/// Which compression backend the store should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    /// Native DEFLATE when compiled in, LZ78 otherwise.
    #[default]
    Auto,
    Native,
    Fallback,
    Disabled,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (TABCACHE_*)
/// 2. TOML config file (if TABCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Snapshots retained per tab before the oldest is evicted.
    #[serde(default = "default_max_snapshots_per_tab")]
    pub max_snapshots_per_tab: usize,

    /// Maximum stored characters per snapshot before truncation.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    /// Content longer than this many characters is compressed.
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: usize,

    /// Snapshots not read for this long are dropped by cleanup.
    #[serde(default = "default_max_cache_age_ms")]
    pub max_cache_age_ms: u64,

    /// Interval of the periodic cleanup task.
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,

    /// Compression backend selection.
    ///
    /// Set via TABCACHE_COMPRESSION (auto, native, fallback, disabled).
    #[serde(default)]
    pub compression: CompressionMode,

    /// Trailing debounce window for mutation and navigation triggers.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Scrapes allowed per tab within the rate-limit window.
    #[serde(default = "default_rate_limit_max_scrapes")]
    pub rate_limit_max_scrapes: usize,

    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,

    /// First backoff entered when the rate limit is exceeded; doubles per violation.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Repeat scrapes of the same URL inside this window are skipped.
    #[serde(default = "default_duplicate_url_window_ms")]
    pub duplicate_url_window_ms: u64,

    /// URL polling interval of the polling navigation observer.
    #[serde(default = "default_navigation_poll_ms")]
    pub navigation_poll_ms: u64,

    /// Freshness window for general content requests.
    #[serde(default = "default_current_max_age_ms")]
    pub current_max_age_ms: u64,

    /// Freshness window for summary requests.
    #[serde(default = "default_summary_max_age_ms")]
    pub summary_max_age_ms: u64,
}

fn default_max_snapshots_per_tab() -> usize {
    5
}

fn default_max_content_length() -> usize {
    500_000
}

fn default_compression_threshold() -> usize {
    50_000
}

fn default_max_cache_age_ms() -> u64 {
    24 * 60 * 60 * 1000
}

fn default_cleanup_interval_ms() -> u64 {
    60 * 60 * 1000
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_rate_limit_max_scrapes() -> usize {
    5
}

fn default_rate_limit_window_ms() -> u64 {
    60_000
}

fn default_backoff_base_ms() -> u64 {
    5_000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

fn default_duplicate_url_window_ms() -> u64 {
    2_000
}

fn default_navigation_poll_ms() -> u64 {
    1_000
}

fn default_current_max_age_ms() -> u64 {
    2 * 60 * 1000
}

fn default_summary_max_age_ms() -> u64 {
    5 * 60 * 1000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_snapshots_per_tab: default_max_snapshots_per_tab(),
            max_content_length: default_max_content_length(),
            compression_threshold: default_compression_threshold(),
            max_cache_age_ms: default_max_cache_age_ms(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
            compression: CompressionMode::Auto,
            debounce_ms: default_debounce_ms(),
            rate_limit_max_scrapes: default_rate_limit_max_scrapes(),
            rate_limit_window_ms: default_rate_limit_window_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            duplicate_url_window_ms: default_duplicate_url_window_ms(),
            navigation_poll_ms: default_navigation_poll_ms(),
            current_max_age_ms: default_current_max_age_ms(),
            summary_max_age_ms: default_summary_max_age_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `TABCACHE_`
    /// 2. TOML file from `TABCACHE_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("TABCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("TABCACHE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Limits for the snapshot store.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_snapshots_per_tab: self.max_snapshots_per_tab,
            max_content_length: self.max_content_length,
            compression_threshold: self.compression_threshold,
            max_cache_age: chrono::Duration::milliseconds(self.max_cache_age_ms as i64),
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn navigation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.navigation_poll_ms)
    }

    pub fn rate_limit_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.rate_limit_window_ms as i64)
    }

    pub fn backoff_base(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.backoff_base_ms as i64)
    }

    pub fn backoff_max(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.backoff_max_ms as i64)
    }

    pub fn duplicate_url_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.duplicate_url_window_ms as i64)
    }

    pub fn current_max_age(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.current_max_age_ms as i64)
    }

    pub fn summary_max_age(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.summary_max_age_ms as i64)
    }
}
