//! Runtime configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the preview tool.
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    /// JSON file holding persisted sources (None = in-memory only)
    pub storage_path: Option<PathBuf>,
    /// Quiet period after the last edit before a fragment is saved
    pub save_debounce_ms: u64,
    /// Maximum time for scripts of one document in milliseconds (None = unlimited)
    pub timeout_ms: Option<u64>,
    /// Maximum isolate heap size in bytes (None = unlimited)
    pub max_heap_size: Option<usize>,
    /// Origins remote sources may be fetched from (empty = any http/https origin)
    pub allowed_origins: Vec<String>,
    /// Per-request timeout for remote sources in seconds
    pub fetch_timeout_secs: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            storage_path: None,
            save_debounce_ms: 300,
            timeout_ms: Some(5_000),
            max_heap_size: Some(64 * 1024 * 1024), // 64MB default
            allowed_origins: vec![],
            fetch_timeout_secs: 30,
        }
    }
}

impl PreviewConfig {
    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
