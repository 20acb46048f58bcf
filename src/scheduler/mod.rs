//! # Scheduler Module
//!
//! The adaptive polling scheduler and the actor that drives it.
//!
//! This module handles:
//! - The Stopped/Active state machine around the [`Subscription`]
//! - Throttling raw samples into the durable record log
//! - Stall and degraded-accuracy watchdogs with restart-on-trigger
//! - Publishing display state for every accepted sample
//!
//! [`PollingScheduler`] is plain synchronous state. It is owned by exactly
//! one [`runner::SchedulerRunner`] task, which serializes source events,
//! operator commands and the periodic tick.

pub mod runner;
pub mod watchdog;

pub use runner::{SchedulerHandle, SchedulerRunner, RunnerIntervals};
pub use watchdog::WatchdogState;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::Result;
use crate::logging::{session_stem, DiagnosticLog, RecordLog};
use crate::power::BatteryGauge;
use crate::profile::PowerMode;
use crate::record::{enrich, RawSample, Session};
use crate::source::{SourceEvent, Subscription, TaggedEvent};
use crate::state::SharedState;

/// Timing and threshold parameters of the scheduler
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    /// Minimum spacing between samples promoted to the record log
    pub save_interval: Duration,
    /// Silence after which the subscription is considered stalled
    pub gap_threshold: Duration,
    /// Period of the gap check tick
    pub gap_check_interval: Duration,
    /// Accuracy (m) at or above which a fix counts as poor
    pub poor_accuracy_m: f32,
    /// How long a run of poor fixes may last before a restart
    pub poor_accuracy_window: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            save_interval: Duration::from_secs(10),
            gap_threshold: Duration::from_secs(10 * 60),
            gap_check_interval: Duration::from_secs(60),
            poor_accuracy_m: 100.0,
            poor_accuracy_window: Duration::from_secs(5 * 60),
        }
    }
}

/// Output files of one session
struct SessionLogs {
    session: Session,
    records: RecordLog,
    trail: DiagnosticLog,
}

impl SessionLogs {
    /// Picks unused file names and claims them with the first trail line
    fn open(log_dir: &Path, now_ms: i64) -> Self {
        let session = Session::new(now_ms);
        let stem = session_stem(log_dir, now_ms);
        let logs = Self {
            records: RecordLog::for_session(log_dir, &stem),
            trail: DiagnosticLog::for_session(log_dir, &stem),
            session,
        };
        let claim = format!("Session {} started", logs.session.id());
        logs.trail.record(now_ms, &claim);
        logs
    }
}

/// State machine owning the subscription, the watchdogs and the log writers
pub struct PollingScheduler {
    subscription: Subscription,
    settings: SchedulerSettings,
    clock: Arc<dyn Clock>,
    battery: Arc<dyn BatteryGauge>,
    state: SharedState,
    log_dir: PathBuf,
    active: bool,
    mode: PowerMode,
    logs: Option<SessionLogs>,
    watchdog: WatchdogState,
    restarts: u64,
}

impl PollingScheduler {
    /// Creates a stopped scheduler
    ///
    /// The initial power mode is taken from the published state.
    pub fn new(
        subscription: Subscription,
        settings: SchedulerSettings,
        clock: Arc<dyn Clock>,
        battery: Arc<dyn BatteryGauge>,
        state: SharedState,
        log_dir: impl Into<PathBuf>,
    ) -> Self {
        let mode = PowerMode::from_low_power(state.snapshot().low_power_mode);
        let watchdog = WatchdogState::new(clock.now_ms());

        Self {
            subscription,
            settings,
            clock,
            battery,
            state,
            log_dir: log_dir.into(),
            active: false,
            mode,
            logs: None,
            watchdog,
            restarts: 0,
        }
    }

    /// Activates (or re-arms) the subscription under `mode`
    ///
    /// Leaving the Stopped state begins a new session with its own record
    /// and trail files. Calling this while Active restarts the subscription
    /// under `mode` and keeps the session.
    ///
    /// # Errors
    ///
    /// Returns the source error if the subscription cannot be opened. The
    /// scheduler is Stopped afterwards.
    pub fn start(&mut self, mode: PowerMode) -> Result<()> {
        let now = self.clock.now_ms();
        self.mode = mode;

        if !self.active {
            let logs = SessionLogs::open(&self.log_dir, now);
            info!(session = logs.session.id(), "Session started");
            self.logs = Some(logs);
            self.watchdog.reset_throttle();
        }

        match self.subscription.open(mode.profile()) {
            Ok(()) => {
                self.active = true;
                self.watchdog.arm(now);
                self.trail(now, &format!("Location updates started ({})", mode));
                info!(%mode, "Location updates started");
                self.state.publish_mode(mode, true);
                Ok(())
            }
            Err(e) => {
                self.active = false;
                self.trail(now, &format!("Failed to start location updates: {}", e));
                error!("Failed to start location updates: {}", e);
                self.state.publish_mode(mode, false);
                Err(e)
            }
        }
    }

    /// Closes the subscription; a no-op when already Stopped
    pub fn stop(&mut self) {
        if !self.active {
            return;
        }

        let now = self.clock.now_ms();
        self.subscription.close();
        self.active = false;
        self.trail(now, "Location updates stopped");
        info!("Location updates stopped");
        self.state.publish_mode(self.mode, false);
    }

    /// Switches power mode
    ///
    /// When Active this re-arms the subscription under the new profile;
    /// when Stopped it only remembers the mode for the next start.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub fn set_profile(&mut self, mode: PowerMode) -> Result<()> {
        if self.active {
            return self.start(mode);
        }

        self.mode = mode;
        self.state.publish_mode(mode, false);
        debug!(%mode, "Power mode set while stopped");
        Ok(())
    }

    /// Consumes one event from the source channel
    ///
    /// Events are dropped while Stopped or when they belong to a closed
    /// subscription generation.
    pub fn handle_event(&mut self, tagged: TaggedEvent) {
        if !self.active || !self.subscription.is_current(tagged.generation) {
            debug!(
                generation = tagged.generation,
                current = self.subscription.generation(),
                "Dropping stale source event"
            );
            return;
        }

        match tagged.event {
            SourceEvent::Sample(sample) => self.on_raw_sample(&sample),
            SourceEvent::Satellites { visible, used } => {
                self.state.publish_satellites(visible, used);
            }
        }
    }

    fn on_raw_sample(&mut self, sample: &RawSample) {
        let now = self.clock.now_ms();
        self.watchdog.accept(now);

        let Some(logs) = &self.logs else {
            return;
        };

        logs.trail.record(
            now,
            &format!(
                "Location received: lat={}, lon={}, accuracy={}, provider={}",
                sample.latitude, sample.longitude, sample.accuracy, sample.source
            ),
        );
        self.state.publish_location(sample);

        if self.watchdog.try_log(now, self.settings.save_interval) {
            let record = enrich(
                sample,
                &logs.session,
                self.mode,
                &self.watchdog,
                self.battery.level(),
            );
            match logs.records.append(&record) {
                Ok(()) => logs.trail.record(now, "Location saved"),
                Err(e) => {
                    logs.trail.record(now, &format!("Failed to save location: {}", e));
                    warn!("Failed to append record to {}: {}", logs.records.path().display(), e);
                }
            }
        }

        let degraded = self.watchdog.track_accuracy(
            now,
            sample.accuracy,
            self.settings.poor_accuracy_m,
            self.settings.poor_accuracy_window,
        );
        if degraded {
            let reason = format!(
                "accuracy at or above {} m for over {} s",
                self.settings.poor_accuracy_m,
                self.settings.poor_accuracy_window.as_secs()
            );
            if self.restart(&reason) {
                self.watchdog.arm(now);
            }
        }
    }

    /// Periodic stall check; returns true if a restart succeeded
    ///
    /// A failed restart leaves the stall reference untouched so the next
    /// tick tries again.
    pub fn on_gap_tick(&mut self) -> bool {
        if !self.active {
            return false;
        }

        let now = self.clock.now_ms();
        if !self.watchdog.is_stalled(now, self.settings.gap_threshold) {
            return false;
        }

        let silence_s = self.watchdog.silence_ms(now) / 1000;
        let restarted = self.restart(&format!("no location for {} s", silence_s));
        if restarted {
            self.watchdog.arm(now);
        }
        restarted
    }

    /// Close-then-open under the current mode
    fn restart(&mut self, reason: &str) -> bool {
        let now = self.clock.now_ms();
        self.restarts += 1;
        self.trail(now, &format!("Restarting location updates: {}", reason));
        warn!(restarts = self.restarts, "Restarting location updates: {}", reason);

        self.subscription.close();
        match self.subscription.open(self.mode.profile()) {
            Ok(()) => {
                self.trail(now, "Location updates restarted");
                true
            }
            Err(e) => {
                self.trail(now, &format!("Restart failed, retrying on next check: {}", e));
                error!("Restart failed: {}", e);
                false
            }
        }
    }

    fn trail(&self, now_ms: i64, message: &str) {
        if let Some(logs) = &self.logs {
            logs.trail.record(now_ms, message);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn mode(&self) -> PowerMode {
        self.mode
    }

    /// Current or most recent session
    pub fn session(&self) -> Option<&Session> {
        self.logs.as_ref().map(|logs| &logs.session)
    }

    pub fn record_log(&self) -> Option<&RecordLog> {
        self.logs.as_ref().map(|logs| &logs.records)
    }

    pub fn diagnostic_log(&self) -> Option<&DiagnosticLog> {
        self.logs.as_ref().map(|logs| &logs.trail)
    }

    /// Number of watchdog restarts attempted
    pub fn restart_count(&self) -> u64 {
        self.restarts
    }

    pub fn watchdog(&self) -> &WatchdogState {
        &self.watchdog
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn battery_level(&self) -> i32 {
        self.battery.level()
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::mocks::ManualClock;
    use crate::error::GeotrailError;
    use crate::logging::CSV_HEADER;
    use crate::power::battery::mocks::FixedBattery;
    use crate::source::mocks::{RecordingSource, SourceProbe};
    use crate::source::{GpsdSource, MockPositionSource};
    use crate::state::NO_LOCATION_YET;
    use std::fs;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    const T0: i64 = 1_714_564_800_000;

    struct Harness {
        scheduler: PollingScheduler,
        probe: SourceProbe,
        events: mpsc::UnboundedReceiver<TaggedEvent>,
        clock: ManualClock,
        state: SharedState,
        battery: Arc<FixedBattery>,
        _dir: TempDir,
    }

    impl Harness {
        fn new(low_power: bool) -> Self {
            let dir = TempDir::new().unwrap();
            let clock = ManualClock::new(T0);
            let (source, probe) = RecordingSource::new();
            let (tx, events) = mpsc::unbounded_channel();
            let state = SharedState::new(low_power, false);
            let battery = Arc::new(FixedBattery::new(80));

            let scheduler = PollingScheduler::new(
                Subscription::new(Box::new(source), tx),
                SchedulerSettings::default(),
                Arc::new(clock.clone()),
                battery.clone(),
                state.clone(),
                dir.path().join("logs"),
            );

            Self {
                scheduler,
                probe,
                events,
                clock,
                state,
                battery,
                _dir: dir,
            }
        }

        fn pump(&mut self) {
            while let Ok(event) = self.events.try_recv() {
                self.scheduler.handle_event(event);
            }
        }

        /// Advances the clock to `at_s` seconds after T0 and delivers a fix
        fn feed_at(&mut self, at_s: u64, accuracy: f32, speed: f32, is_mock: bool) {
            self.feed_at_ms(at_s as i64 * 1000, accuracy, speed, is_mock);
        }

        fn feed_at_ms(&mut self, at_ms: i64, accuracy: f32, speed: f32, is_mock: bool) {
            self.clock.set(T0 + at_ms);
            let sample = RawSample {
                timestamp_ms: T0 + at_ms,
                latitude: 52.52,
                longitude: 13.405,
                altitude: 34.0,
                accuracy,
                speed,
                bearing: 90.0,
                source: "gps".to_string(),
                is_mock,
            };
            assert!(self.probe.deliver(SourceEvent::Sample(sample)));
            self.pump();
        }

        fn rows(&self) -> Vec<Vec<String>> {
            let Some(log) = self.scheduler.record_log() else {
                return Vec::new();
            };
            let Ok(text) = fs::read_to_string(log.path()) else {
                return Vec::new();
            };
            text.lines()
                .skip(1)
                .map(|line| line.split(',').map(str::to_string).collect())
                .collect()
        }

        fn trail(&self) -> String {
            self.scheduler
                .diagnostic_log()
                .and_then(|log| fs::read_to_string(log.path()).ok())
                .unwrap_or_default()
        }

        fn restarts_in_trail(&self) -> usize {
            self.trail().matches("Restarting location updates").count()
        }
    }

    #[test]
    fn test_normal_scenario_throttles_to_two_rows() {
        let mut h = Harness::new(false);
        h.scheduler.start(PowerMode::Normal).unwrap();

        h.feed_at(0, 10.0, 2.0, false);
        h.feed_at(4, 10.0, 2.0, false);
        h.feed_at(12, 10.0, 2.0, false);

        let rows = h.rows();
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.len(), 15);
            assert_eq!(row[13], "GPS");
            assert_eq!(row[14], "NORMAL");
            assert_eq!(row[5], "7.200");
            assert_eq!(row[9], "80");
            assert_eq!(row[12], h.scheduler.session().unwrap().id());
        }

        // Every sample still reaches the trail
        assert_eq!(h.trail().matches("Location received").count(), 3);
    }

    #[test]
    fn test_low_power_mock_sample_is_mock() {
        let mut h = Harness::new(true);
        assert_eq!(h.scheduler.mode(), PowerMode::LowPower);
        h.scheduler.start(PowerMode::LowPower).unwrap();
        assert_eq!(h.probe.last_mode(), Some(PowerMode::LowPower));

        h.feed_at(0, 5.0, 3.0, true);

        let rows = h.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][8], "true");
        assert_eq!(rows[0][13], "MOCK");
        assert_eq!(rows[0][14], "LOW_POWER");
    }

    #[test]
    fn test_eleven_minutes_of_silence_restarts_once() {
        let mut h = Harness::new(false);
        h.scheduler.start(PowerMode::Normal).unwrap();

        let mut restarted = 0;
        for _ in 0..11 {
            h.clock.advance(Duration::from_secs(60));
            if h.scheduler.on_gap_tick() {
                restarted += 1;
            }
        }

        assert_eq!(restarted, 1);
        assert_eq!(h.scheduler.restart_count(), 1);
        assert_eq!(h.restarts_in_trail(), 1);
        assert_eq!(h.probe.open_count(), 2);
        assert_eq!(h.scheduler.watchdog().last_accepted_at(), T0 + 660_000);
    }

    #[test]
    fn test_samples_keep_gap_watchdog_quiet() {
        let mut h = Harness::new(false);
        h.scheduler.start(PowerMode::Normal).unwrap();

        for minute in 1..=30 {
            h.feed_at(minute * 60, 10.0, 2.0, false);
            assert!(!h.scheduler.on_gap_tick());
        }
        assert_eq!(h.scheduler.restart_count(), 0);
    }

    #[test]
    fn test_gap_tick_ignored_while_stopped() {
        let mut h = Harness::new(false);
        h.clock.advance(Duration::from_secs(3600));
        assert!(!h.scheduler.on_gap_tick());
        assert_eq!(h.probe.open_count(), 0);
    }

    #[test]
    fn test_failed_gap_restart_retries_next_tick() {
        let mut h = Harness::new(false);
        h.scheduler.start(PowerMode::Normal).unwrap();

        h.clock.advance(Duration::from_secs(11 * 60));
        h.probe.set_failure(Some("gpsd gone"));
        assert!(!h.scheduler.on_gap_tick());
        assert!(h.scheduler.is_active());
        assert_eq!(h.scheduler.watchdog().last_accepted_at(), T0);
        assert!(h.trail().contains("Restart failed"));

        h.probe.set_failure(None);
        h.clock.advance(Duration::from_secs(60));
        assert!(h.scheduler.on_gap_tick());
        assert_eq!(h.scheduler.restart_count(), 2);
        assert_eq!(h.scheduler.watchdog().last_accepted_at(), T0 + 12 * 60_000);
    }

    #[test]
    fn test_poor_accuracy_forces_restart() {
        let mut h = Harness::new(false);
        h.scheduler.start(PowerMode::Normal).unwrap();

        for step in 0..=10 {
            h.feed_at(step * 30, 150.0, 0.0, false);
        }
        // 0..300 s is not yet longer than the window
        assert_eq!(h.probe.open_count(), 1);

        h.feed_at(330, 150.0, 0.0, false);
        assert_eq!(h.probe.open_count(), 2);
        assert_eq!(h.restarts_in_trail(), 1);
        assert_eq!(h.scheduler.watchdog().poor_accuracy_since(), None);
    }

    #[test]
    fn test_good_fix_clears_poor_accuracy_run() {
        let mut h = Harness::new(false);
        h.scheduler.start(PowerMode::Normal).unwrap();

        h.feed_at(0, 150.0, 0.0, false);
        h.feed_at(200, 12.0, 0.0, false);
        h.feed_at(250, 150.0, 0.0, false);
        h.feed_at(400, 150.0, 0.0, false);

        assert_eq!(h.probe.open_count(), 1);
        assert_eq!(h.scheduler.watchdog().poor_accuracy_since(), Some(T0 + 250_000));
    }

    #[test]
    fn test_throttle_bounds_rows() {
        let mut h = Harness::new(false);
        h.scheduler.start(PowerMode::Normal).unwrap();

        for second in 0..60 {
            h.feed_at(second, 8.0, 1.0, false);
        }
        assert_eq!(h.rows().len(), 6);
    }

    #[test]
    fn test_idle_after_stop() {
        let mut h = Harness::new(false);
        h.scheduler.start(PowerMode::Normal).unwrap();
        h.scheduler.stop();
        assert!(!h.scheduler.is_active());
        assert!(!h.state.snapshot().logging_enabled);

        let mut observer = h.state.subscribe();
        observer.borrow_and_update();

        // Late delivery from the closed subscription
        h.feed_at(5, 10.0, 2.0, false);

        assert!(h.rows().is_empty());
        assert!(!observer.has_changed().unwrap());
        assert_eq!(h.state.snapshot().location_text, NO_LOCATION_YET);
        assert!(!h.trail().contains("Location received"));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut h = Harness::new(false);
        h.scheduler.stop();
        h.scheduler.start(PowerMode::Normal).unwrap();
        h.scheduler.stop();
        h.scheduler.stop();
        assert_eq!(h.probe.close_count(), 1);
    }

    #[test]
    fn test_stale_generation_dropped_after_profile_switch() {
        let mut h = Harness::new(false);
        h.scheduler.start(PowerMode::Normal).unwrap();
        h.scheduler.set_profile(PowerMode::LowPower).unwrap();

        let late = RawSample {
            timestamp_ms: T0,
            latitude: 1.0,
            longitude: 1.0,
            altitude: 0.0,
            accuracy: 5.0,
            speed: 1.0,
            bearing: 0.0,
            source: "gps".to_string(),
            is_mock: false,
        };
        assert!(h.probe.deliver_via(0, SourceEvent::Sample(late)));
        h.pump();
        assert!(h.rows().is_empty());

        h.feed_at(1, 5.0, 1.0, false);
        assert_eq!(h.rows().len(), 1);
        assert_eq!(h.rows()[0][14], "LOW_POWER");
    }

    #[test]
    fn test_session_changes_only_when_leaving_stopped() {
        let mut h = Harness::new(false);
        h.scheduler.start(PowerMode::Normal).unwrap();
        let first = h.scheduler.session().unwrap().clone();

        h.scheduler.set_profile(PowerMode::LowPower).unwrap();
        h.scheduler.start(PowerMode::LowPower).unwrap();
        assert_eq!(h.scheduler.session(), Some(&first));

        h.scheduler.stop();
        h.clock.advance(Duration::from_secs(2));
        h.scheduler.start(PowerMode::Normal).unwrap();
        let second = h.scheduler.session().unwrap();
        assert_ne!(second.id(), first.id());
        assert_eq!(second.started_at_ms(), T0 + 2000);
    }

    #[test]
    fn test_first_sample_of_new_session_is_logged() {
        let mut h = Harness::new(false);
        h.scheduler.start(PowerMode::Normal).unwrap();
        h.feed_at(0, 10.0, 2.0, false);
        h.scheduler.stop();

        h.clock.set(T0 + 2000);
        h.scheduler.start(PowerMode::Normal).unwrap();
        h.feed_at(3, 10.0, 2.0, false);
        assert_eq!(h.rows().len(), 1);
    }

    #[test]
    fn test_restart_within_same_second_gets_own_files() {
        let mut h = Harness::new(false);
        h.scheduler.start(PowerMode::Normal).unwrap();
        h.feed_at(0, 10.0, 2.0, false);
        let first_session = h.scheduler.session().unwrap().id().to_string();
        let first_track = h.scheduler.record_log().unwrap().path().to_path_buf();
        let first_trail = h.scheduler.diagnostic_log().unwrap().path().to_path_buf();
        h.scheduler.stop();

        h.clock.set(T0 + 400);
        h.scheduler.start(PowerMode::Normal).unwrap();
        h.feed_at_ms(600, 10.0, 2.0, false);

        assert_ne!(h.scheduler.record_log().unwrap().path(), first_track.as_path());
        assert_ne!(h.scheduler.diagnostic_log().unwrap().path(), first_trail.as_path());

        // The new session's first sample is logged in its own file
        let rows = h.rows();
        assert_eq!(rows.len(), 1);
        assert_ne!(rows[0][12], first_session);

        let first = fs::read_to_string(&first_track).unwrap();
        assert_eq!(first.lines().count(), 2);
        assert!(first.lines().skip(1).all(|line| line.contains(&first_session)));
        assert!(fs::read_to_string(&first_trail).unwrap().contains(&first_session));
    }

    #[test]
    fn test_battery_level_follows_gauge() {
        let mut h = Harness::new(false);
        h.scheduler.start(PowerMode::Normal).unwrap();

        h.feed_at(0, 10.0, 2.0, false);
        h.battery.set(42);
        h.feed_at(10, 10.0, 2.0, false);

        let rows = h.rows();
        assert_eq!(rows[0][9], "80");
        assert_eq!(rows[1][9], "42");
    }

    #[tokio::test]
    async fn test_unreachable_gpsd_fails_start() {
        let dir = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let state = SharedState::new(false, false);
        let source = GpsdSource::new("127.0.0.1:1", Duration::from_millis(200));
        let mut scheduler = PollingScheduler::new(
            Subscription::new(Box::new(source), tx),
            SchedulerSettings::default(),
            Arc::new(ManualClock::new(T0)),
            Arc::new(FixedBattery::new(-1)),
            state.clone(),
            dir.path(),
        );

        let result = scheduler.start(PowerMode::Normal);
        assert!(matches!(result, Err(GeotrailError::SourceUnavailable(_))));
        assert!(!scheduler.is_active());
        assert!(!state.snapshot().logging_enabled);

        // Nothing retries until the next operator start
        assert!(!scheduler.on_gap_tick());
        assert_eq!(scheduler.restart_count(), 0);
    }

    #[test]
    fn test_start_failure_returns_to_stopped() {
        let mut h = Harness::new(false);
        h.probe.set_failure(Some("gpsd not running"));

        let result = h.scheduler.start(PowerMode::Normal);
        assert!(matches!(result, Err(GeotrailError::SourceUnavailable(_))));
        assert!(!h.scheduler.is_active());
        assert!(!h.state.snapshot().logging_enabled);
        assert!(h.trail().contains("Failed to start location updates"));
    }

    #[test]
    fn test_set_profile_while_stopped_only_remembers() {
        let mut h = Harness::new(false);
        h.scheduler.set_profile(PowerMode::LowPower).unwrap();

        assert_eq!(h.probe.open_count(), 0);
        assert_eq!(h.scheduler.mode(), PowerMode::LowPower);
        assert!(h.state.snapshot().low_power_mode);
    }

    #[test]
    fn test_satellites_published_while_active() {
        let mut h = Harness::new(false);
        h.scheduler.start(PowerMode::Normal).unwrap();

        h.probe.deliver(SourceEvent::Satellites { visible: 9, used: 6 });
        h.pump();
        assert_eq!(h.state.snapshot().satellite_text, "Satellites: 9 (used in fix: 6)");
    }

    #[test]
    fn test_header_written_once_across_reopen() {
        let mut h = Harness::new(false);
        h.scheduler.start(PowerMode::Normal).unwrap();
        h.feed_at(0, 10.0, 2.0, false);
        h.feed_at(10, 10.0, 2.0, false);

        let path = h.scheduler.record_log().unwrap().path().to_path_buf();
        let again = RecordLog::new(&path);
        let record = enrich(
            &RawSample {
                timestamp_ms: T0 + 20_000,
                latitude: 0.0,
                longitude: 0.0,
                altitude: 0.0,
                accuracy: 1.0,
                speed: 0.0,
                bearing: 0.0,
                source: "gps".to_string(),
                is_mock: false,
            },
            h.scheduler.session().unwrap(),
            PowerMode::Normal,
            h.scheduler.watchdog(),
            -1,
        );
        again.append(&record).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches(CSV_HEADER).count(), 1);
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn test_source_interaction_counts() {
        let mut source = MockPositionSource::new();
        source.expect_subscribe().times(2).returning(|_, _| Ok(()));
        source.expect_unsubscribe().times(1).return_const(());

        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(T0);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut scheduler = PollingScheduler::new(
            Subscription::new(Box::new(source), tx),
            SchedulerSettings::default(),
            Arc::new(clock.clone()),
            Arc::new(FixedBattery::new(-1)),
            SharedState::new(false, false),
            dir.path(),
        );

        scheduler.start(PowerMode::Normal).unwrap();
        clock.advance(Duration::from_secs(601));
        assert!(scheduler.on_gap_tick());
    }
}
