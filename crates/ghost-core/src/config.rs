//! Engine configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use crate::url::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GhostConfig {
    /// Lifetime of session scratch data and the process pointer, in seconds.
    pub session_overdue: u64,
    /// Upper bound on tasks kept in a process after garbage collection.
    pub process_max_tasks: usize,
    /// Lock TTL in seconds. Also the effective turn timeout.
    pub process_lock_overdue: u64,
    /// TTL of a saved process when its root task does not set one.
    pub process_default_overdue: u64,
    /// Reply sent when the process is locked by another turn.
    pub on_busy: String,
    /// Reply sent when a turn fails on an engine error.
    pub on_unexpected: String,
    /// Maximum error source frames written to the log for a failed turn.
    pub exception_traceback_limit: usize,
    /// Maximum operators executed in one turn.
    pub operator_depth_cap: usize,
    /// Think (and optional stage) every new process is rooted at.
    pub root_url: Url,
}

impl Default for GhostConfig {
    fn default() -> Self {
        Self {
            session_overdue: 3_600,
            process_max_tasks: 20,
            process_lock_overdue: 30,
            process_default_overdue: 86_400,
            on_busy: "I'm still working on your previous message, please wait.".into(),
            on_unexpected: "Something went wrong, please try again.".into(),
            exception_traceback_limit: 8,
            operator_depth_cap: 100,
            root_url: Url::new("main"),
        }
    }
}

impl GhostConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
