use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::types::error::TriageError;

/// Engine tuning knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of cached detail bodies
    pub detail_cache_capacity: usize,

    /// Age after which a cached body is treated as a miss
    pub detail_cache_ttl_secs: u64,

    /// Pointer dwell time before a hover prefetch starts
    pub hover_prefetch_delay_ms: u64,

    /// Items warmed after a fresh list load
    pub warmup_prefetch_count: usize,

    /// Quiet period before counts are reconciled from the service
    pub reconcile_debounce_ms: u64,

    /// Concurrent remote calls per bulk batch
    pub bulk_batch_size: usize,

    /// Minimum time the bulk progress indicator stays visible
    pub bulk_min_visible_ms: u64,

    /// Bulk size at which gated actions wait for confirmation
    pub bulk_confirm_threshold: usize,

    /// Undo history depth
    pub undo_capacity: usize,

    /// Items requested per list page
    pub page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            detail_cache_capacity: 20,
            detail_cache_ttl_secs: 5 * 60,
            hover_prefetch_delay_ms: 150,
            warmup_prefetch_count: 5,
            reconcile_debounce_ms: 400,
            bulk_batch_size: 3,
            bulk_min_visible_ms: 300,
            bulk_confirm_threshold: 10,
            undo_capacity: 10,
            page_size: 50,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(contents: &str) -> Result<Self, TriageError> {
        let config: EngineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self, TriageError> {
        let contents = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        info!("Loaded engine config from {:?}", path);
        Ok(config)
    }

    /// Load from the first default path that exists, or fall back to defaults
    pub fn load_default() -> Result<Self, TriageError> {
        for path in default_config_paths() {
            if path.exists() {
                return Self::load(&path);
            }
        }

        info!("No engine config file found, using defaults");
        Ok(Self::default())
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), TriageError> {
        if self.detail_cache_capacity == 0 {
            return Err(TriageError::Config(
                "detail_cache_capacity must be at least 1".into(),
            ));
        }
        if self.bulk_batch_size == 0 {
            return Err(TriageError::Config("bulk_batch_size must be at least 1".into()));
        }
        if self.undo_capacity == 0 {
            return Err(TriageError::Config("undo_capacity must be at least 1".into()));
        }
        if self.page_size == 0 {
            return Err(TriageError::Config("page_size must be at least 1".into()));
        }
        Ok(())
    }

    pub fn detail_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.detail_cache_ttl_secs)
    }

    pub fn hover_prefetch_delay(&self) -> Duration {
        Duration::from_millis(self.hover_prefetch_delay_ms)
    }

    pub fn reconcile_debounce(&self) -> Duration {
        Duration::from_millis(self.reconcile_debounce_ms)
    }

    pub fn bulk_min_visible(&self) -> Duration {
        Duration::from_millis(self.bulk_min_visible_ms)
    }
}

/// Get default config paths
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // XDG config path
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("triage-sync").join("config.toml"));
    }

    // Home directory fallback
    if let Some(home_dir) = dirs::home_dir() {
        paths.push(
            home_dir
                .join(".config")
                .join("triage-sync")
                .join("config.toml"),
        );
    }

    paths
}
