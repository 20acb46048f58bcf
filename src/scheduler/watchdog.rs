//! # Watchdog State
//!
//! Timestamps the scheduler uses to throttle durable writes and to detect a
//! source that has gone silent or stuck on a degraded fix.
//!
//! ## Throttle window
//!
//! A sample is promoted to the durable log only when at least the save
//! interval has passed since the previous promoted sample. The first sample
//! of a session is always promoted.
//!
//! ## Stall detection
//!
//! `last_accepted_at` advances on every in-session sample and never moves
//! backwards. When it is older than the gap threshold at a tick, the
//! subscription is considered stalled.
//!
//! ## Degraded accuracy
//!
//! The window starts at the first poor-accuracy sample of an uninterrupted
//! run and is cleared by any sample under the threshold. A run longer than
//! the accuracy window is treated like a stall.

use std::time::Duration;

/// Throttle and watchdog timestamps, all in epoch milliseconds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogState {
    last_accepted_at: i64,
    last_logged_at: Option<i64>,
    poor_accuracy_since: Option<i64>,
}

impl WatchdogState {
    /// Creates a watchdog armed at `now_ms`
    #[must_use]
    pub fn new(now_ms: i64) -> Self {
        Self {
            last_accepted_at: now_ms,
            last_logged_at: None,
            poor_accuracy_since: None,
        }
    }

    /// Time of the most recent in-session sample or re-arm
    #[must_use]
    pub fn last_accepted_at(&self) -> i64 {
        self.last_accepted_at
    }

    /// Time of the most recent sample promoted to the durable log
    #[must_use]
    pub fn last_logged_at(&self) -> Option<i64> {
        self.last_logged_at
    }

    /// Start of the current poor-accuracy run, if any
    #[must_use]
    pub fn poor_accuracy_since(&self) -> Option<i64> {
        self.poor_accuracy_since
    }

    /// Resets the stall reference after a (re)subscription
    pub fn arm(&mut self, now_ms: i64) {
        self.touch(now_ms);
        self.poor_accuracy_since = None;
    }

    /// Forgets the throttle window so the next sample is always logged
    pub fn reset_throttle(&mut self) {
        self.last_logged_at = None;
    }

    /// Records the arrival of an in-session sample
    pub fn accept(&mut self, now_ms: i64) {
        self.touch(now_ms);
    }

    /// Returns true and restarts the window if a sample may be logged now
    pub fn try_log(&mut self, now_ms: i64, save_interval: Duration) -> bool {
        let due = match self.last_logged_at {
            None => true,
            Some(last) => now_ms - last >= millis(save_interval),
        };

        if due {
            self.last_logged_at = Some(now_ms);
        }

        due
    }

    /// True when nothing has been accepted for longer than `threshold`
    #[must_use]
    pub fn is_stalled(&self, now_ms: i64, threshold: Duration) -> bool {
        now_ms - self.last_accepted_at > millis(threshold)
    }

    /// Milliseconds since the last accepted sample
    #[must_use]
    pub fn silence_ms(&self, now_ms: i64) -> i64 {
        (now_ms - self.last_accepted_at).max(0)
    }

    /// Tracks a sample's accuracy; returns true when the degraded run is too long
    ///
    /// A sample at or above `threshold_m` extends (or starts) the run. Once the
    /// run has lasted longer than `window`, the caller should restart the
    /// subscription and then call [`arm`](Self::arm).
    pub fn track_accuracy(
        &mut self,
        now_ms: i64,
        accuracy_m: f32,
        threshold_m: f32,
        window: Duration,
    ) -> bool {
        if accuracy_m < threshold_m {
            self.poor_accuracy_since = None;
            return false;
        }

        let since = *self.poor_accuracy_since.get_or_insert(now_ms);
        now_ms - since > millis(window)
    }

    fn touch(&mut self, now_ms: i64) {
        self.last_accepted_at = self.last_accepted_at.max(now_ms);
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
