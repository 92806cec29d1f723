//! State persistence
//!
//! Stores the tracked identity and observed state between runs. The
//! controller itself never touches disk.

use crate::reconcile::TrackedResource;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// JSON file holding at most one tracked resource
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location under the user data directory
    pub fn default_path() -> PathBuf {
        if let Some(data_dir) = dirs::data_dir() {
            return data_dir.join("greseller").join("state.json");
        }
        if let Some(home) = dirs::home_dir() {
            return home.join(".greseller").join("state.json");
        }
        PathBuf::from("greseller.state.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load tracked state; a missing file means nothing is tracked
    pub fn load(&self) -> Result<Option<TrackedResource>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file {}", self.path.display()))?;
        let tracked = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt state file {}", self.path.display()))?;
        Ok(Some(tracked))
    }

    /// Save tracked state, or remove the file when nothing is tracked
    pub fn save(&self, tracked: Option<&TrackedResource>) -> Result<()> {
        let Some(tracked) = tracked else {
            if self.path.exists() {
                std::fs::remove_file(&self.path).with_context(|| {
                    format!("Failed to remove state file {}", self.path.display())
                })?;
            }
            return Ok(());
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(tracked)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write state file {}", self.path.display()))?;

        tracing::debug!("State saved to {}", self.path.display());
        Ok(())
    }
}
