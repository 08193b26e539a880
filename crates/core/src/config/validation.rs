//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

/// Upper bound for every `*_ms` setting: one year.
pub const MAX_DURATION_MS: u64 = 365 * 24 * 60 * 60 * 1000;

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_snapshots_per_tab`, `max_content_length` or `rate_limit_max_scrapes` is 0
    /// - `debounce_ms` is outside 300..=500
    /// - `rate_limit_window_ms`, `cleanup_interval_ms` or `navigation_poll_ms` is 0
    /// - any `*_ms` value exceeds [`MAX_DURATION_MS`]
    /// - `backoff_base_ms` exceeds `backoff_max_ms`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_snapshots_per_tab == 0 {
            return Err(ConfigError::Invalid { field: "max_snapshots_per_tab".into(), reason: "must be greater than 0".into() });
        }

        if self.max_content_length == 0 {
            return Err(ConfigError::Invalid { field: "max_content_length".into(), reason: "must be greater than 0".into() });
        }

        if !(300..=500).contains(&self.debounce_ms) {
            return Err(ConfigError::Invalid { field: "debounce_ms".into(), reason: "must be between 300 and 500".into() });
        }

        if self.rate_limit_max_scrapes == 0 {
            return Err(ConfigError::Invalid { field: "rate_limit_max_scrapes".into(), reason: "must be greater than 0".into() });
        }

        let durations = [
            ("max_cache_age_ms", self.max_cache_age_ms),
            ("cleanup_interval_ms", self.cleanup_interval_ms),
            ("rate_limit_window_ms", self.rate_limit_window_ms),
            ("backoff_base_ms", self.backoff_base_ms),
            ("backoff_max_ms", self.backoff_max_ms),
            ("duplicate_url_window_ms", self.duplicate_url_window_ms),
            ("navigation_poll_ms", self.navigation_poll_ms),
            ("current_max_age_ms", self.current_max_age_ms),
            ("summary_max_age_ms", self.summary_max_age_ms),
        ];
        for (field, value) in durations {
            if value > MAX_DURATION_MS {
                return Err(ConfigError::Invalid { field: field.into(), reason: "must not exceed one year".into() });
            }
        }

        // Periods fed to tokio intervals or the rate window.
        for (field, value) in [
            ("rate_limit_window_ms", self.rate_limit_window_ms),
            ("cleanup_interval_ms", self.cleanup_interval_ms),
            ("navigation_poll_ms", self.navigation_poll_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid { field: field.into(), reason: "must be greater than 0".into() });
            }
        }

        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(ConfigError::Invalid { field: "backoff_base_ms".into(), reason: "must not exceed backoff_max_ms".into() });
        }

        if self.compression_threshold >= self.max_content_length {
            tracing::warn!(
                compression_threshold = self.compression_threshold,
                max_content_length = self.max_content_length,
                "compression_threshold is not below max_content_length; \
                 snapshots will never be compressed"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_snapshots() {
        let config = AppConfig { max_snapshots_per_tab: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "max_snapshots_per_tab"));
    }

    #[test]
    fn test_validate_zero_content_length() {
        let config = AppConfig { max_content_length: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "max_content_length"));
    }

    #[test]
    fn test_validate_debounce_bounds() {
        for debounce_ms in [299, 501] {
            let config = AppConfig { debounce_ms, ..Default::default() };
            let result = config.validate();
            assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "debounce_ms"));
        }
        for debounce_ms in [300, 500] {
            let config = AppConfig { debounce_ms, ..Default::default() };
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_validate_rate_limit() {
        let config = AppConfig { rate_limit_max_scrapes: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "rate_limit_max_scrapes"));

        let config = AppConfig { rate_limit_window_ms: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "rate_limit_window_ms"));
    }

    #[test]
    fn test_validate_zero_poll_interval() {
        let config = AppConfig { navigation_poll_ms: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "navigation_poll_ms"));
    }

    #[test]
    fn test_validate_zero_cleanup_interval() {
        let config = AppConfig { cleanup_interval_ms: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "cleanup_interval_ms"));
    }

    #[test]
    fn test_validate_duration_upper_bound() {
        let config = AppConfig { max_cache_age_ms: u64::MAX, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "max_cache_age_ms"));

        let config = AppConfig { rate_limit_window_ms: MAX_DURATION_MS + 1, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "rate_limit_window_ms"));

        let config = AppConfig { summary_max_age_ms: MAX_DURATION_MS, ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_backoff_order() {
        let config = AppConfig { backoff_base_ms: 90_000, backoff_max_ms: 60_000, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "backoff_base_ms"));
    }

    #[test]
    fn test_validate_threshold_above_limit_only_warns() {
        let config = AppConfig { compression_threshold: 600_000, ..Default::default() };
        assert!(config.validate().is_ok());
    }
}
