//! Sample, session and record types.

use std::fmt;

use uuid::Uuid;

use crate::profile::PowerMode;

/// One position fix pushed by the positioning source
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    /// Fix time in milliseconds since the Unix epoch
    pub timestamp_ms: i64,

    /// Latitude in degrees
    pub latitude: f64,

    /// Longitude in degrees
    pub longitude: f64,

    /// Altitude in meters
    pub altitude: f64,

    /// Horizontal accuracy radius in meters
    pub accuracy: f32,

    /// Ground speed in m/s
    pub speed: f32,

    /// Course over ground in degrees
    pub bearing: f32,

    /// Provider or device that produced the fix
    pub source: String,

    /// Fix was injected by a simulated provider
    pub is_mock: bool,
}

/// One continuous activation of the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
    started_at_ms: i64,
}

impl Session {
    /// Creates a session with a fresh random identifier
    #[must_use]
    pub fn new(started_at_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started_at_ms,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn started_at_ms(&self) -> i64 {
        self.started_at_ms
    }
}

/// Heuristic guess at what produced a fix
///
/// Derived from accuracy and speed, not reported by the source, so it is
/// only an approximation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceQuality {
    Gps,
    Wifi,
    Cell,
    Mock,
}

impl SourceQuality {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceQuality::Gps => "GPS",
            SourceQuality::Wifi => "WIFI",
            SourceQuality::Cell => "CELL",
            SourceQuality::Mock => "MOCK",
        }
    }
}

impl fmt::Display for SourceQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw sample plus the fields derived at enrichment time
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub sample: RawSample,

    /// Speed in km/h, rounded to three decimals
    pub speed_kmh: f64,

    pub session_id: String,

    /// Battery percentage, -1 when unknown
    pub battery_level: i32,

    /// Delivery latency: enrichment time minus fix time
    pub sample_age_ms: i64,

    pub is_stationary: bool,

    pub source_quality: SourceQuality,

    pub profile: PowerMode,
}
