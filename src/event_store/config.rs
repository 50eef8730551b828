//! Store configuration

use std::env;

use chrono::Duration;
use tracing::warn;

use crate::types::DEFAULT_PAGE_LIMIT;

pub const BULK_BATCH_SIZE_ENV: &str = "ERRORSTACK_BULK_BATCH_SIZE";
pub const MAX_PAGE_LIMIT_ENV: &str = "ERRORSTACK_MAX_PAGE_LIMIT";

#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Documents patched per round trip in bulk operations
    pub bulk_batch_size: usize,
    pub default_page_limit: usize,
    pub max_page_limit: usize,
    /// When set, previous/next lookups only look this far either side of
    /// the anchor event
    pub navigation_window: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bulk_batch_size: 500,
            default_page_limit: DEFAULT_PAGE_LIMIT,
            max_page_limit: 1000,
            navigation_window: None,
        }
    }
}

impl StoreConfig {
    /// Defaults overridden by `ERRORSTACK_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; invalid values keep the default
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bulk_batch_size: positive(&lookup, BULK_BATCH_SIZE_ENV, defaults.bulk_batch_size),
            max_page_limit: positive(&lookup, MAX_PAGE_LIMIT_ENV, defaults.max_page_limit),
            ..defaults
        }
    }

    pub fn with_bulk_batch_size(mut self, size: usize) -> Self {
        self.bulk_batch_size = size.max(1);
        self
    }

    pub fn with_page_limits(mut self, default_limit: usize, max_limit: usize) -> Self {
        self.default_page_limit = default_limit.max(1);
        self.max_page_limit = max_limit.max(self.default_page_limit);
        self
    }

    pub fn with_navigation_window(mut self, window: Option<Duration>) -> Self {
        self.navigation_window = window;
        self
    }
}

fn positive(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => value,
        _ => {
            warn!(key, value = %raw, default, "Ignoring invalid configuration value");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = StoreConfig::from_lookup(lookup(&[]));
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.bulk_batch_size, 500);
        assert_eq!(config.default_page_limit, 10);
        assert_eq!(config.max_page_limit, 1000);
        assert!(config.navigation_window.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = StoreConfig::from_lookup(lookup(&[
            (BULK_BATCH_SIZE_ENV, "250"),
            (MAX_PAGE_LIMIT_ENV, " 50 "),
        ]));
        assert_eq!(config.bulk_batch_size, 250);
        assert_eq!(config.max_page_limit, 50);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = StoreConfig::from_lookup(lookup(&[
            (BULK_BATCH_SIZE_ENV, "lots"),
            (MAX_PAGE_LIMIT_ENV, "0"),
        ]));
        assert_eq!(config.bulk_batch_size, 500);
        assert_eq!(config.max_page_limit, 1000);
    }

    #[test]
    fn test_builders_clamp() {
        let config = StoreConfig::default()
            .with_bulk_batch_size(0)
            .with_page_limits(20, 5);
        assert_eq!(config.bulk_batch_size, 1);
        assert_eq!(config.default_page_limit, 20);
        assert_eq!(config.max_page_limit, 20);
    }
}
