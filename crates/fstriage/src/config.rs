//! Configuration for fstriage
//!
//! Loaded from `<home>/config.toml` (or an explicit path). A missing file
//! yields the defaults; command-line flags are layered on top by the binary.

use crate::error::{Result, TriageError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageConfig {
    /// Path to the inventory store
    #[serde(default = "paths::default_db_path")]
    pub database_path: PathBuf,

    /// Extra paths pruned from traversal, on top of the platform defaults
    #[serde(default)]
    pub exclude: Vec<PathBuf>,

    /// Skip files that vanish or cannot be read instead of aborting the run
    #[serde(default)]
    pub skip_unreadable: bool,

    /// Fit the demo classifier after each scan
    #[serde(default = "default_true")]
    pub train_demo_model: bool,

    #[serde(default)]
    pub identify: IdentifyConfig,
}

/// Which identification tiers may be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyConfig {
    /// Allow the content-signature tier (MIME database sniffing)
    #[serde(default = "default_true")]
    pub content_sniff: bool,

    /// Allow the lightweight magic-number tier
    #[serde(default = "default_true")]
    pub signatures: bool,
}

fn default_true() -> bool {
    true
}

impl Default for IdentifyConfig {
    fn default() -> Self {
        Self {
            content_sniff: true,
            signatures: true,
        }
    }
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            database_path: paths::default_db_path(),
            exclude: Vec::new(),
            skip_unreadable: false,
            train_demo_model: true,
            identify: IdentifyConfig::default(),
        }
    }
}

impl TriageConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TriageError::io(path, e))?;
        toml::from_str(&content)
            .map_err(|e| TriageError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load from `path` if it exists, otherwise return the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| TriageError::Config(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| TriageError::io(path, e))?;
        Ok(())
    }
}
