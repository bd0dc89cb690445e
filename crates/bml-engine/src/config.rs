//! Runtime Configuration

use serde::Deserialize;
use std::time::Duration;

/// Runtime configuration options
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Period of the per-document module watch timer (ms)
    pub module_watch_interval_ms: u64,

    /// Maximum number of cached modules
    pub max_cached_modules: usize,

    /// Maximum total size of cached modules (bytes)
    pub max_cache_bytes: usize,

    /// Report `extended = true` in the ModuleLocked notification of a plain
    /// lock that had to wait for a fetch
    pub plain_async_lock_reports_extended: bool,

    /// Number of document transitions kept in the history
    pub transition_history: usize,
}

impl RuntimeConfig {
    pub fn module_watch_interval(&self) -> Duration {
        Duration::from_millis(self.module_watch_interval_ms)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            module_watch_interval_ms: 1000,
            max_cached_modules: 64,
            max_cache_bytes: 16 * 1024 * 1024, // 16MB
            plain_async_lock_reports_extended: false,
            transition_history: 32,
        }
    }
}
