//! Battery percentage readout.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Level reported when no battery can be read
pub const UNKNOWN_BATTERY_LEVEL: i32 = -1;

/// Default location of Linux power supply entries
const POWER_SUPPLY_DIR: &str = "/sys/class/power_supply";

/// Reads the current battery percentage
pub trait BatteryGauge: Send + Sync {
    /// Percentage 0-100, or [`UNKNOWN_BATTERY_LEVEL`]
    fn level(&self) -> i32;
}

/// Battery gauge backed by a sysfs `capacity` file
#[derive(Debug, Clone)]
pub struct SysfsBattery {
    capacity_path: Option<PathBuf>,
}

impl SysfsBattery {
    /// Uses an explicit `capacity` file
    pub fn new(capacity_path: impl Into<PathBuf>) -> Self {
        Self {
            capacity_path: Some(capacity_path.into()),
        }
    }

    /// Picks the first battery under `/sys/class/power_supply`
    pub fn detect() -> Self {
        Self::detect_in(Path::new(POWER_SUPPLY_DIR))
    }

    /// Picks the first entry in `dir` whose `type` is `Battery`
    pub fn detect_in(dir: &Path) -> Self {
        let mut entries: Vec<PathBuf> = match fs::read_dir(dir) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(e) => {
                debug!("Cannot list {}: {}", dir.display(), e);
                Vec::new()
            }
        };
        // Deterministic pick when several batteries exist
        entries.sort();

        let capacity_path = entries
            .into_iter()
            .filter(|entry| {
                fs::read_to_string(entry.join("type"))
                    .map(|kind| kind.trim() == "Battery")
                    .unwrap_or(false)
            })
            .map(|entry| entry.join("capacity"))
            .find(|capacity| capacity.exists());

        match &capacity_path {
            Some(path) => debug!("Using battery gauge at {}", path.display()),
            None => debug!("No battery found under {}", dir.display()),
        }

        Self { capacity_path }
    }

    pub fn capacity_path(&self) -> Option<&Path> {
        self.capacity_path.as_deref()
    }
}

impl BatteryGauge for SysfsBattery {
    fn level(&self) -> i32 {
        let Some(path) = &self.capacity_path else {
            return UNKNOWN_BATTERY_LEVEL;
        };

        fs::read_to_string(path)
            .ok()
            .and_then(|text| text.trim().parse::<i32>().ok())
            .filter(|level| (0..=100).contains(level))
            .unwrap_or(UNKNOWN_BATTERY_LEVEL)
    }
}
