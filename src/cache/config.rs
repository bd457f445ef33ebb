//! Cache configuration.
//!
//! Controls the live (per-plug) and historical (per-operation) body caches via
//! the `[cache]` section of `graphsync.toml`.

use serde::Deserialize;

/// Cache configuration resolved from settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the per-plug live body caches.
    pub enable_live_cache: bool,
    /// Enable the per-operation historical body caches.
    pub enable_historical_cache: bool,
    /// Build renderable representations under full caching.
    pub materialize_renderables: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_live_cache: true,
            enable_historical_cache: true,
            materialize_renderables: true,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enable_live_cache: settings.enable_live_cache,
            enable_historical_cache: settings.enable_historical_cache,
            materialize_renderables: settings.materialize_renderables,
        }
    }
}

impl CacheConfig {
    /// Returns true if any cache kind is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enable_live_cache || self.enable_historical_cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enable_live_cache);
        assert!(config.enable_historical_cache);
        assert!(config.materialize_renderables);
        assert!(config.is_enabled());
    }

    #[test]
    fn is_disabled_when_both_off() {
        let config = CacheConfig {
            enable_live_cache: false,
            enable_historical_cache: false,
            ..Default::default()
        };
        assert!(!config.is_enabled());
    }
}
