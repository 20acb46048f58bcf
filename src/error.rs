//! # Error Types
//!
//! Custom error types for Geotrail using `thiserror`.

use thiserror::Error;

/// Main error type for Geotrail
#[derive(Debug, Error)]
pub enum GeotrailError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Preference file could not be encoded
    #[error("Preference encoding error: {0}")]
    Preferences(#[from] toml::ser::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Positioning source rejected the subscription or is absent
    #[error("Position source unavailable: {0}")]
    SourceUnavailable(String),

    /// Wake lock could not be acquired
    #[error("Wake lock error: {0}")]
    WakeLock(String),

    /// The scheduler task has exited and no longer accepts commands
    #[error("Scheduler is no longer running")]
    SchedulerClosed,
}

/// Result type alias for Geotrail
pub type Result<T> = std::result::Result<T, GeotrailError>;
