//! JSON file-backed persistence for the IAST scanner.
//!
//! Provides [`JsonStore`], a generic key-value store that keeps data in memory
//! and snapshots to a JSON file on every write. The Durable Queue, Report
//! table, and Target Configuration table are all thin typed wrappers over
//! this store — it plays the role of the relational store the scanner
//! proper treats as an external collaborator.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A simple JSON file-backed store for a single domain of data.
///
/// Keeps data in memory and snapshots to `{state_path}/state/{domain}.json` on every write.
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    /// Create a new store for the given domain under `state_path`.
    pub fn new(state_path: &Path, domain: &str) -> Self {
        let path = state_path.join("state").join(format!("{domain}.json"));
        Self { path }
    }

    /// Load data from disk. Returns empty map if file doesn't exist.
    pub fn load<T: for<'de> Deserialize<'de>>(&self) -> HashMap<String, T> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "corrupt state file, starting fresh");
                HashMap::new()
            }),
            Err(_) => {
                debug!(path = %self.path.display(), "no state file, starting fresh");
                HashMap::new()
            }
        }
    }

    /// Save data to disk. Creates directories as needed.
    pub fn save<T: Serialize>(&self, data: &HashMap<String, T>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(data)
            .map_err(std::io::Error::other)?;
        std::fs::write(&self.path, content)
    }

    /// Removes the backing file, if present. Used by lifecycle operations
    /// that drop a whole table.
    pub fn delete_file(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
