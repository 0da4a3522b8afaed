//! Summary cache configuration.

use std::num::NonZeroUsize;

use serde::Deserialize;

const DEFAULT_SUMMARY_LIMIT: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum restaurant summaries held before LRU eviction.
    pub summary_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            summary_limit: DEFAULT_SUMMARY_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            summary_limit: settings.summary_limit.get(),
        }
    }
}

impl CacheConfig {
    /// Returns the summary limit as NonZeroUsize, clamping to 1 if zero.
    pub fn summary_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.summary_limit).unwrap_or(NonZeroUsize::MIN)
    }
}
