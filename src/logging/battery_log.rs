//! Periodic battery log.
//!
//! ```text
//! timestamp,battery_level,gps_logging,low_power_mode
//! 2024-05-01 12:00:00,87,ON,LOW_POWER
//! ```

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use super::{file_stamp, format_timestamp};
use crate::error::Result;
use crate::profile::PowerMode;

pub const BATTERY_HEADER: &str = "timestamp,battery_level,gps_logging,low_power_mode";

/// Append-only battery level log
#[derive(Debug, Clone)]
pub struct BatteryLog {
    path: PathBuf,
}

impl BatteryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log named `battery_<yyyyMMdd_HHmmss>.csv` in `dir`
    pub fn starting_at(dir: &Path, now_ms: i64) -> Self {
        Self::new(dir.join(format!("battery_{}.csv", file_stamp(now_ms))))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one reading
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created or written
    pub fn append(&self, now_ms: i64, level: i32, logging_enabled: bool, mode: PowerMode) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let empty = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);
        if empty {
            writer.write_record(BATTERY_HEADER.split(',')).map_err(std::io::Error::from)?;
        }
        writer
            .write_record([
                format_timestamp(now_ms),
                level.to_string(),
                if logging_enabled { "ON" } else { "OFF" }.to_string(),
                mode.to_string(),
            ])
            .map_err(std::io::Error::from)?;
        writer.flush()?;
        Ok(())
    }
}
