//! # Sampling Profiles
//!
//! Maps the operator's power-mode switch to the subscription parameters used
//! when (re)opening the position source.
//!
//! | Mode      | Min interval | Desired interval | Max delay | Accuracy | Wait for accurate fix |
//! |-----------|--------------|------------------|-----------|----------|-----------------------|
//! | NORMAL    | 3 s          | 5 s              | 10 s      | High     | no                    |
//! | LOW_POWER | 15 s         | 30 s             | 45 s      | Balanced | yes                   |
//!
//! Switching is binary and only takes effect on the next subscription open.

use std::fmt;
use std::time::Duration;

/// Operator-selected power budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerMode {
    Normal,
    LowPower,
}

impl PowerMode {
    /// Maps the persisted low-power flag to a mode
    #[must_use]
    pub fn from_low_power(low_power: bool) -> Self {
        if low_power {
            PowerMode::LowPower
        } else {
            PowerMode::Normal
        }
    }

    #[must_use]
    pub fn is_low_power(self) -> bool {
        self == PowerMode::LowPower
    }

    /// Label used in the record log's `profile` column
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PowerMode::Normal => "NORMAL",
            PowerMode::LowPower => "LOW_POWER",
        }
    }

    /// Returns the canonical profile for this mode
    #[must_use]
    pub fn profile(self) -> &'static SamplingProfile {
        match self {
            PowerMode::Normal => &NORMAL,
            PowerMode::LowPower => &LOW_POWER,
        }
    }
}

impl fmt::Display for PowerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accuracy the source is asked to favour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccuracyPreference {
    High,
    Balanced,
}

/// Subscription parameters for one power mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingProfile {
    pub mode: PowerMode,
    /// Fastest delivery the source may use
    pub min_interval: Duration,
    /// Preferred delivery cadence
    pub desired_interval: Duration,
    /// Longest the source may batch fixes before delivering
    pub max_delay: Duration,
    pub accuracy: AccuracyPreference,
    /// Hold back fixes until the source has an accurate one
    pub wait_for_accurate: bool,
}

pub const NORMAL: SamplingProfile = SamplingProfile {
    mode: PowerMode::Normal,
    min_interval: Duration::from_secs(3),
    desired_interval: Duration::from_secs(5),
    max_delay: Duration::from_secs(10),
    accuracy: AccuracyPreference::High,
    wait_for_accurate: false,
};

pub const LOW_POWER: SamplingProfile = SamplingProfile {
    mode: PowerMode::LowPower,
    min_interval: Duration::from_secs(15),
    desired_interval: Duration::from_secs(30),
    max_delay: Duration::from_secs(45),
    accuracy: AccuracyPreference::Balanced,
    wait_for_accurate: true,
};

/// Selects the sampling profile for the low-power flag
///
/// # Examples
///
/// ```
/// use geotrail::profile::{select_profile, AccuracyPreference};
///
/// let profile = select_profile(true);
/// assert_eq!(profile.accuracy, AccuracyPreference::Balanced);
/// assert!(profile.wait_for_accurate);
/// ```
#[must_use]
pub fn select_profile(low_power: bool) -> &'static SamplingProfile {
    PowerMode::from_low_power(low_power).profile()
}
