//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{GeotrailError, Result};
use crate::scheduler::SchedulerSettings;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub power: PowerConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Output location and the initial operator switches
#[derive(Debug, Deserialize, Clone)]
pub struct RecordingConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_preferences_file")]
    pub preferences_file: String,

    /// Used only when no preferences file exists yet
    #[serde(default = "default_logging_enabled")]
    pub logging_enabled: bool,

    /// Used only when no preferences file exists yet
    #[serde(default = "default_low_power_mode")]
    pub low_power_mode: bool,
}

/// Throttle and watchdog timing
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_save_interval_ms")]
    pub save_interval_ms: u64,

    #[serde(default = "default_gap_threshold_ms")]
    pub gap_threshold_ms: u64,

    #[serde(default = "default_gap_check_interval_ms")]
    pub gap_check_interval_ms: u64,

    #[serde(default = "default_poor_accuracy_m")]
    pub poor_accuracy_m: f32,

    #[serde(default = "default_poor_accuracy_window_ms")]
    pub poor_accuracy_window_ms: u64,
}

/// gpsd connection settings
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_gpsd_addr")]
    pub gpsd_addr: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Wake lock and battery settings
#[derive(Debug, Deserialize, Clone)]
pub struct PowerConfig {
    #[serde(default = "default_keep_awake")]
    pub keep_awake: bool,

    /// Path to a `capacity` file; empty means autodetect
    #[serde(default)]
    pub battery_path: String,

    #[serde(default = "default_battery_log_interval_ms")]
    pub battery_log_interval_ms: u64,
}

/// Status reporter settings
#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

// Default value functions
fn default_log_dir() -> String { "./logs".to_string() }
fn default_preferences_file() -> String { "./logs/preferences.toml".to_string() }
fn default_logging_enabled() -> bool { true }
fn default_low_power_mode() -> bool { true }

fn default_save_interval_ms() -> u64 { 10_000 }
fn default_gap_threshold_ms() -> u64 { 600_000 }
fn default_gap_check_interval_ms() -> u64 { 60_000 }
fn default_poor_accuracy_m() -> f32 { 100.0 }
fn default_poor_accuracy_window_ms() -> u64 { 300_000 }

fn default_gpsd_addr() -> String { "127.0.0.1:2947".to_string() }
fn default_connect_timeout_ms() -> u64 { 3000 }

fn default_keep_awake() -> bool { true }
fn default_battery_log_interval_ms() -> u64 { 60_000 }

fn default_refresh_interval_ms() -> u64 { 5000 }

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            preferences_file: default_preferences_file(),
            logging_enabled: default_logging_enabled(),
            low_power_mode: default_low_power_mode(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            save_interval_ms: default_save_interval_ms(),
            gap_threshold_ms: default_gap_threshold_ms(),
            gap_check_interval_ms: default_gap_check_interval_ms(),
            poor_accuracy_m: default_poor_accuracy_m(),
            poor_accuracy_window_ms: default_poor_accuracy_window_ms(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            gpsd_addr: default_gpsd_addr(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            keep_awake: default_keep_awake(),
            battery_path: String::new(),
            battery_log_interval_ms: default_battery_log_interval_ms(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
        }
    }
}

impl SchedulerConfig {
    /// Converts the millisecond fields into scheduler timing settings
    pub fn settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            save_interval: Duration::from_millis(self.save_interval_ms),
            gap_threshold: Duration::from_millis(self.gap_threshold_ms),
            gap_check_interval: Duration::from_millis(self.gap_check_interval_ms),
            poor_accuracy_m: self.poor_accuracy_m,
            poor_accuracy_window: Duration::from_millis(self.poor_accuracy_window_ms),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use geotrail::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.recording.log_dir.is_empty() {
            return Err(invalid("recording log_dir cannot be empty"));
        }

        if self.recording.preferences_file.is_empty() {
            return Err(invalid("recording preferences_file cannot be empty"));
        }

        if self.scheduler.save_interval_ms == 0 || self.scheduler.save_interval_ms > 3_600_000 {
            return Err(invalid("save_interval_ms must be between 1 and 3600000"));
        }

        if self.scheduler.gap_check_interval_ms < 1000 || self.scheduler.gap_check_interval_ms > 3_600_000 {
            return Err(invalid("gap_check_interval_ms must be between 1000 and 3600000"));
        }

        // The stall check can only fire once per tick, so a shorter threshold would be meaningless
        if self.scheduler.gap_threshold_ms < self.scheduler.gap_check_interval_ms {
            return Err(invalid("gap_threshold_ms must be at least gap_check_interval_ms"));
        }

        if !(self.scheduler.poor_accuracy_m > 0.0) {
            return Err(invalid("poor_accuracy_m must be greater than 0"));
        }

        if self.scheduler.poor_accuracy_window_ms == 0 {
            return Err(invalid("poor_accuracy_window_ms must be greater than 0"));
        }

        if self.source.gpsd_addr.is_empty() {
            return Err(invalid("gpsd_addr cannot be empty"));
        }

        if self.source.connect_timeout_ms == 0 || self.source.connect_timeout_ms > 60_000 {
            return Err(invalid("connect_timeout_ms must be between 1 and 60000"));
        }

        if self.power.battery_log_interval_ms < 1000 {
            return Err(invalid("battery_log_interval_ms must be at least 1000"));
        }

        if self.display.refresh_interval_ms < 100 || self.display.refresh_interval_ms > 600_000 {
            return Err(invalid("refresh_interval_ms must be between 100 and 600000"));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> GeotrailError {
    GeotrailError::Config(toml::de::Error::custom(message))
}
