//! Scheduler actor.
//!
//! One tokio task owns the [`PollingScheduler`] and serializes the three
//! ingress paths through a biased `select!`:
//!
//! ```text
//! SchedulerHandle ──commands──┐
//! PositionSource ───events────┼──► SchedulerRunner ──► PollingScheduler
//! interval ─────────ticks─────┘
//! ```
//!
//! Commands carry a oneshot reply, so `stop().await` returns only after the
//! subscription has been closed.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::PollingScheduler;
use crate::error::{GeotrailError, Result};
use crate::logging::BatteryLog;
use crate::power::Presence;
use crate::profile::PowerMode;
use crate::source::TaggedEvent;

/// Queue depth for operator commands
const COMMAND_CHANNEL_CAPACITY: usize = 16;

/// Presence text while the scheduler is stopped
pub const PAUSED_NOTICE: &str = "Position recording paused";

enum Command {
    Start {
        mode: PowerMode,
        reply: oneshot::Sender<Result<()>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    SetProfile {
        mode: PowerMode,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Periods of the runner's timers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerIntervals {
    /// Gap check and presence refresh
    pub gap_check: Duration,
    /// Battery log sampling
    pub battery_log: Duration,
}

/// Cloneable control surface of a running scheduler
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Start { mode, .. } => write!(f, "Start({})", mode),
            Command::Stop { .. } => write!(f, "Stop"),
            Command::SetProfile { mode, .. } => write!(f, "SetProfile({})", mode),
        }
    }
}

impl SchedulerHandle {
    /// Starts (or re-arms) recording under `mode`
    ///
    /// # Errors
    ///
    /// Returns the source error if the subscription cannot be opened, or
    /// [`GeotrailError::SchedulerClosed`] if the runner has exited.
    pub async fn start(&self, mode: PowerMode) -> Result<()> {
        self.request(|reply| Command::Start { mode, reply }).await?
    }

    /// Stops recording; returns once the subscription is closed
    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Switches power mode, re-arming the subscription when recording
    pub async fn set_profile(&self, mode: PowerMode) -> Result<()> {
        self.request(|reply| Command::SetProfile { mode, reply }).await?
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| GeotrailError::SchedulerClosed)?;
        response.await.map_err(|_| GeotrailError::SchedulerClosed)
    }
}

/// The actor that owns a [`PollingScheduler`]
pub struct SchedulerRunner {
    scheduler: PollingScheduler,
    events: mpsc::UnboundedReceiver<TaggedEvent>,
    commands: mpsc::Receiver<Command>,
    presence: Box<dyn Presence>,
    battery_log: Option<BatteryLog>,
    intervals: RunnerIntervals,
}

impl SchedulerRunner {
    /// Creates the runner and its handle
    ///
    /// `events` must be the receiving end of the channel the scheduler's
    /// subscription was built with.
    pub fn new(
        scheduler: PollingScheduler,
        events: mpsc::UnboundedReceiver<TaggedEvent>,
        presence: Box<dyn Presence>,
        battery_log: Option<BatteryLog>,
        intervals: RunnerIntervals,
    ) -> (Self, SchedulerHandle) {
        let (tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let runner = Self {
            scheduler,
            events,
            commands,
            presence,
            battery_log,
            intervals,
        };
        (runner, SchedulerHandle { commands: tx })
    }

    /// Runs until `shutdown` is cancelled, then stops and returns the scheduler
    pub async fn run(mut self, shutdown: CancellationToken) -> PollingScheduler {
        let mut gap_tick = interval(self.intervals.gap_check);
        gap_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        gap_tick.tick().await;

        let mut battery_tick = interval(self.intervals.battery_log);
        battery_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.announce();
        info!("Scheduler running");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    self.scheduler.stop();
                    self.announce();
                    info!("Scheduler shutting down");
                    break;
                }

                Some(command) = self.commands.recv() => {
                    self.execute(command);
                }

                Some(event) = self.events.recv() => {
                    self.scheduler.handle_event(event);
                }

                _ = gap_tick.tick() => {
                    self.scheduler.on_gap_tick();
                    self.announce();
                }

                _ = battery_tick.tick() => {
                    self.log_battery();
                }
            }
        }

        self.scheduler
    }

    fn execute(&mut self, command: Command) {
        debug!(?command, "Scheduler command");
        match command {
            Command::Start { mode, reply } => {
                let _ = reply.send(self.scheduler.start(mode));
            }
            Command::Stop { reply } => {
                self.scheduler.stop();
                let _ = reply.send(());
            }
            Command::SetProfile { mode, reply } => {
                let _ = reply.send(self.scheduler.set_profile(mode));
            }
        }
        self.announce();
    }

    fn announce(&mut self) {
        let text = if self.scheduler.is_active() {
            format!("Recording position ({})", self.scheduler.mode())
        } else {
            PAUSED_NOTICE.to_string()
        };
        self.presence.announce(&text);
    }

    fn log_battery(&self) {
        let Some(log) = &self.battery_log else {
            return;
        };

        let result = log.append(
            self.scheduler.now_ms(),
            self.scheduler.battery_level(),
            self.scheduler.is_active(),
            self.scheduler.mode(),
        );
        if let Err(e) = result {
            warn!("Failed to write battery log {}: {}", log.path().display(), e);
        }
    }
}
