//! Operator preferences persisted across process restarts.
//!
//! Stored as a small TOML file. Writes go to a sibling temp file that is then
//! renamed over the target, so a crash never leaves a half-written file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Result;
use crate::profile::PowerMode;

/// The two operator switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_true")]
    pub logging_enabled: bool,

    #[serde(default = "default_true")]
    pub low_power_mode: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            logging_enabled: true,
            low_power_mode: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Preferences {
    pub fn mode(&self) -> PowerMode {
        PowerMode::from_low_power(self.low_power_mode)
    }
}

/// Reads and writes [`Preferences`] at a fixed path
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads stored preferences
    ///
    /// Returns `None` when nothing has been stored yet.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(&self) -> Result<Option<Preferences>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No preferences at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Some(toml::from_str(&contents)?))
    }

    /// Stores `preferences`, replacing the file atomically
    ///
    /// # Errors
    ///
    /// Returns error if serialization or any file operation fails
    pub fn save(&self, preferences: &Preferences) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string(preferences)?;
        let staging = self.path.with_extension("toml.tmp");
        fs::write(&staging, contents)?;
        fs::rename(&staging, &self.path)?;

        info!(
            logging_enabled = preferences.logging_enabled,
            low_power_mode = preferences.low_power_mode,
            "Preferences saved"
        );
        Ok(())
    }
}
