//! # Published State
//!
//! Last-known snapshot shown by the display surface and used to persist the
//! operator's switches across restarts.
//!
//! The scheduler is the only writer. Readers either poll
//! [`SharedState::snapshot`] or hold a `watch` receiver from
//! [`SharedState::subscribe`] and wait for changes.

use std::sync::Arc;

use tokio::sync::watch;

use crate::logging::format_timestamp;
use crate::profile::PowerMode;
use crate::record::RawSample;

/// Location text before the first fix arrives
pub const NO_LOCATION_YET: &str = "No position yet";

/// Satellite text before the first satellite report arrives
pub const NO_SATELLITES_YET: &str = "No satellite data yet";

/// Snapshot read by the display surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedState {
    pub location_text: String,
    pub satellite_text: String,
    pub low_power_mode: bool,
    pub logging_enabled: bool,
}

impl PublishedState {
    fn initial(low_power_mode: bool, logging_enabled: bool) -> Self {
        Self {
            location_text: NO_LOCATION_YET.to_string(),
            satellite_text: NO_SATELLITES_YET.to_string(),
            low_power_mode,
            logging_enabled,
        }
    }
}

/// Cloneable handle to the published snapshot
#[derive(Debug, Clone)]
pub struct SharedState {
    sender: Arc<watch::Sender<PublishedState>>,
}

impl SharedState {
    /// Creates the holder with "no data yet" sentinels
    pub fn new(low_power_mode: bool, logging_enabled: bool) -> Self {
        let (sender, _) = watch::channel(PublishedState::initial(low_power_mode, logging_enabled));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Copy of the current snapshot
    pub fn snapshot(&self) -> PublishedState {
        self.sender.borrow().clone()
    }

    /// Receiver notified on every write
    pub fn subscribe(&self) -> watch::Receiver<PublishedState> {
        self.sender.subscribe()
    }

    pub(crate) fn publish_location(&self, sample: &RawSample) {
        let text = location_text(sample);
        self.sender.send_modify(|state| state.location_text = text);
    }

    pub(crate) fn publish_satellites(&self, visible: u32, used: u32) {
        let text = format!("Satellites: {} (used in fix: {})", visible, used);
        self.sender.send_modify(|state| state.satellite_text = text);
    }

    pub(crate) fn publish_mode(&self, mode: PowerMode, logging_enabled: bool) {
        self.sender.send_modify(|state| {
            state.low_power_mode = mode.is_low_power();
            state.logging_enabled = logging_enabled;
        });
    }
}

/// Multi-line summary of a fix for the display surface
pub fn location_text(sample: &RawSample) -> String {
    format!(
        "Time: {}\nLatitude: {}\nLongitude: {}\nAltitude: {} m\nAccuracy: {} m\nSpeed: {:.3} km/h\nBearing: {}°\nProvider: {}",
        format_timestamp(sample.timestamp_ms),
        sample.latitude,
        sample.longitude,
        sample.altitude,
        sample.accuracy,
        f64::from(sample.speed) * 3.6,
        sample.bearing,
        sample.source,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RawSample {
        RawSample {
            timestamp_ms: 1_700_000_000_000,
            latitude: 35.5,
            longitude: 139.25,
            altitude: 12.0,
            accuracy: 4.0,
            speed: 1.0,
            bearing: 180.0,
            source: "gpsd".to_string(),
            is_mock: false,
        }
    }

    #[test]
    fn test_initial_sentinels() {
        let state = SharedState::new(true, false);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.location_text, NO_LOCATION_YET);
        assert_eq!(snapshot.satellite_text, NO_SATELLITES_YET);
        assert!(snapshot.low_power_mode);
        assert!(!snapshot.logging_enabled);
    }

    #[test]
    fn test_publish_without_receivers() {
        // Writes must land even when nobody is watching
        let state = SharedState::new(false, true);
        state.publish_satellites(12, 7);
        assert_eq!(state.snapshot().satellite_text, "Satellites: 12 (used in fix: 7)");
    }

    #[test]
    fn test_location_text() {
        let text = location_text(&sample());
        assert!(text.contains("Latitude: 35.5"));
        assert!(text.contains("Speed: 3.600 km/h"));
        assert!(text.contains("Provider: gpsd"));
        assert_eq!(text.lines().count(), 8);
    }

    #[test]
    fn test_subscribers_see_changes() {
        let state = SharedState::new(false, true);
        let mut rx = state.subscribe();
        assert!(!rx.has_changed().unwrap());

        state.publish_location(&sample());
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().location_text.contains("Latitude: 35.5"));

        state.publish_mode(PowerMode::LowPower, false);
        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert!(snapshot.low_power_mode);
        assert!(!snapshot.logging_enabled);
    }
}
