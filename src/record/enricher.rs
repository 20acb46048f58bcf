//! # Sample Enrichment
//!
//! Turns a raw sample into the record persisted in the track log.
//!
//! Derived fields:
//! - `speed_kmh`: m/s × 3.6, rounded to three decimals
//! - `sample_age_ms`: enrichment time minus fix time
//! - `is_stationary`: speed below 0.5 m/s
//! - `source_quality`: accuracy/speed heuristic (see [`classify_source`])
//!
//! Enrichment takes the current time from the watchdog's last-accepted
//! timestamp rather than reading a clock, so the same inputs always produce
//! the same record.

use super::types::{EnrichedRecord, RawSample, Session, SourceQuality};
use crate::profile::PowerMode;
use crate::scheduler::WatchdogState;

/// Conversion factor from m/s to km/h
pub const KMH_PER_MPS: f64 = 3.6;

/// Speeds below this (m/s) count as stationary
pub const STATIONARY_SPEED_MPS: f32 = 0.5;

/// Accuracy (m) below which a moving fix is classified as GPS
const GPS_ACCURACY_M: f32 = 20.0;

/// Accuracy (m) below which a slow fix is classified as Wi-Fi
const WIFI_ACCURACY_M: f32 = 50.0;

/// Builds the log record for a sample
///
/// # Arguments
///
/// * `sample` - Raw fix from the source
/// * `session` - Session the record is written under
/// * `profile` - Power mode active when the fix arrived
/// * `watchdog` - Watchdog state; its last-accepted time is the enrichment time
/// * `battery_level` - Battery percentage, -1 when unknown
#[must_use]
pub fn enrich(
    sample: &RawSample,
    session: &Session,
    profile: PowerMode,
    watchdog: &WatchdogState,
    battery_level: i32,
) -> EnrichedRecord {
    let speed_kmh = (f64::from(sample.speed) * KMH_PER_MPS * 1000.0).round() / 1000.0;

    EnrichedRecord {
        sample: sample.clone(),
        speed_kmh,
        session_id: session.id().to_string(),
        battery_level,
        sample_age_ms: watchdog.last_accepted_at() - sample.timestamp_ms,
        is_stationary: sample.speed < STATIONARY_SPEED_MPS,
        source_quality: classify_source(sample),
        profile,
    }
}

/// Guesses the provider type from mock flag, accuracy and speed
///
/// # Examples
///
/// ```
/// use geotrail::record::{classify_source, RawSample, SourceQuality};
///
/// let sample = RawSample {
///     timestamp_ms: 0,
///     latitude: 35.0,
///     longitude: 139.0,
///     altitude: 10.0,
///     accuracy: 30.0,
///     speed: 0.0,
///     bearing: 0.0,
///     source: "gpsd".to_string(),
///     is_mock: false,
/// };
/// assert_eq!(classify_source(&sample), SourceQuality::Wifi);
/// ```
#[must_use]
pub fn classify_source(sample: &RawSample) -> SourceQuality {
    if sample.is_mock {
        SourceQuality::Mock
    } else if sample.accuracy < GPS_ACCURACY_M && sample.speed > STATIONARY_SPEED_MPS {
        SourceQuality::Gps
    } else if sample.accuracy < WIFI_ACCURACY_M && sample.speed <= STATIONARY_SPEED_MPS {
        SourceQuality::Wifi
    } else {
        SourceQuality::Cell
    }
}
