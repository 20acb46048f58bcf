//! # Geotrail
//!
//! Records position fixes from a local gpsd daemon into per-session CSV
//! track logs, adapting the sampling cadence to a power mode and recovering
//! from stalled or degraded fixes without operator intervention.
//!
//! Usage: `geotrail [config.toml]`
//!
//! Operator control while running:
//! - `SIGUSR1` toggles low power mode
//! - `SIGUSR2` toggles recording
//! - `Ctrl+C` stops recording and exits

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use geotrail::clock::{Clock, SystemClock};
use geotrail::config::Config;
use geotrail::logging::{init_tracing, BatteryLog};
use geotrail::power::{
    BatteryGauge, InhibitorLock, NoopWakeLock, SysfsBattery, TracingPresence, WakeGuard, WakeLock,
};
use geotrail::preferences::{PreferenceStore, Preferences};
use geotrail::scheduler::{PollingScheduler, RunnerIntervals, SchedulerHandle, SchedulerRunner};
use geotrail::source::{GpsdSource, Subscription};
use geotrail::state::{PublishedState, SharedState};

/// Config file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Name reported to the sleep inhibitor
const INHIBITOR_WHO: &str = "geotrail";

/// Main entry point
///
/// # Control Flow
///
/// 1. Load configuration and set up logging
/// 2. Restore operator preferences and hold the wake lock
/// 3. Spawn the scheduler actor and start recording if enabled
/// 4. React to operator signals until Ctrl+C
/// 5. Stop the scheduler, then release the wake lock
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let (config, found) = load_config(&config_path)?;

    let log_dir = PathBuf::from(&config.recording.log_dir);
    let _tracing = init_tracing(&log_dir).context("failed to initialize logging")?;

    info!("Geotrail v{} starting...", env!("CARGO_PKG_VERSION"));
    if found {
        info!("Loaded configuration from {}", config_path.display());
    } else {
        warn!("{} not found, using default configuration", config_path.display());
    }

    let store = PreferenceStore::new(&config.recording.preferences_file);
    let mut preferences = initial_preferences(&store, &config);
    info!(
        logging_enabled = preferences.logging_enabled,
        low_power_mode = preferences.low_power_mode,
        "Preferences restored"
    );

    let wake_guard = acquire_wake_guard(config.power.keep_awake);

    let clock = Arc::new(SystemClock);
    let battery: Arc<dyn BatteryGauge> = if config.power.battery_path.is_empty() {
        Arc::new(SysfsBattery::detect())
    } else {
        Arc::new(SysfsBattery::new(&config.power.battery_path))
    };

    let source = GpsdSource::new(
        config.source.gpsd_addr.clone(),
        Duration::from_millis(config.source.connect_timeout_ms),
    );
    info!("Using gpsd at {}", source.addr());

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let state = SharedState::new(preferences.low_power_mode, false);
    let settings = config.scheduler.settings();
    let intervals = RunnerIntervals {
        gap_check: settings.gap_check_interval,
        battery_log: Duration::from_millis(config.power.battery_log_interval_ms),
    };
    let battery_log = BatteryLog::starting_at(&log_dir, clock.now_ms());

    let scheduler = PollingScheduler::new(
        Subscription::new(Box::new(source), events_tx),
        settings,
        clock,
        battery,
        state.clone(),
        &log_dir,
    );
    let (runner, handle) = SchedulerRunner::new(
        scheduler,
        events_rx,
        Box::new(TracingPresence::new()),
        Some(battery_log),
        intervals,
    );

    let shutdown = CancellationToken::new();
    let runner_task = tokio::spawn(runner.run(shutdown.clone()));
    let status_task = tokio::spawn(report_status(
        state.clone(),
        Duration::from_millis(config.display.refresh_interval_ms),
        shutdown.clone(),
    ));

    if preferences.logging_enabled {
        if let Err(e) = handle.start(preferences.mode()).await {
            error!("Recording not started: {}", e);
        }
    }

    let mut toggle_power = signal(SignalKind::user_defined1()).context("failed to register SIGUSR1")?;
    let mut toggle_logging = signal(SignalKind::user_defined2()).context("failed to register SIGUSR2")?;
    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            _ = toggle_power.recv() => {
                preferences.low_power_mode = !preferences.low_power_mode;
                info!("Low power mode {}", on_off(preferences.low_power_mode));
                apply_preferences(&handle, &preferences).await;
                save_preferences(&store, &preferences);
            }

            _ = toggle_logging.recv() => {
                preferences.logging_enabled = !preferences.logging_enabled;
                info!("Recording {}", on_off(preferences.logging_enabled));
                apply_preferences(&handle, &preferences).await;
                save_preferences(&store, &preferences);
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    shutdown.cancel();
    let scheduler = runner_task.await.context("scheduler task failed")?;
    info!(restarts = scheduler.restart_count(), "Scheduler stopped");
    status_task.await.context("status task failed")?;

    drop(wake_guard);
    info!("Geotrail stopped");
    Ok(())
}

/// Loads `path`, or defaults when it does not exist
///
/// Returns the config and whether the file was found.
fn load_config(path: &Path) -> Result<(Config, bool)> {
    if !path.exists() {
        return Ok((Config::default(), false));
    }

    let config = Config::load(path)
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok((config, true))
}

/// Stored preferences, falling back to the configured switches
fn initial_preferences(store: &PreferenceStore, config: &Config) -> Preferences {
    let configured = Preferences {
        logging_enabled: config.recording.logging_enabled,
        low_power_mode: config.recording.low_power_mode,
    };

    match store.load() {
        Ok(Some(stored)) => stored,
        Ok(None) => configured,
        Err(e) => {
            warn!("Ignoring unreadable preferences {}: {}", store.path().display(), e);
            configured
        }
    }
}

fn acquire_wake_guard(keep_awake: bool) -> Option<WakeGuard> {
    let lock: Box<dyn WakeLock> = if keep_awake {
        Box::new(InhibitorLock::new(INHIBITOR_WHO, "Recording position"))
    } else {
        Box::new(NoopWakeLock::default())
    };

    match WakeGuard::acquire(lock) {
        Ok(guard) => Some(guard),
        Err(e) => {
            warn!("Continuing without wake lock: {}", e);
            None
        }
    }
}

/// Brings the scheduler in line with the operator's switches
async fn apply_preferences(handle: &SchedulerHandle, preferences: &Preferences) {
    let result = if preferences.logging_enabled {
        handle.start(preferences.mode()).await
    } else {
        match handle.stop().await {
            Ok(()) => handle.set_profile(preferences.mode()).await,
            Err(e) => Err(e),
        }
    };

    if let Err(e) = result {
        error!("Failed to apply preferences: {}", e);
    }
}

fn save_preferences(store: &PreferenceStore, preferences: &Preferences) {
    if let Err(e) = store.save(preferences) {
        warn!("Failed to save preferences to {}: {}", store.path().display(), e);
    }
}

/// Logs the published state at a fixed period until shutdown
async fn report_status(state: SharedState, every: Duration, shutdown: CancellationToken) {
    let mut tick = interval(every);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tick.tick() => info!("{}", status_text(&state.snapshot())),
        }
    }
}

fn status_text(state: &PublishedState) -> String {
    format!(
        "Recording {} ({} power)\n{}\n{}",
        on_off(state.logging_enabled),
        if state.low_power_mode { "low" } else { "normal" },
        state.location_text,
        state.satellite_text,
    )
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "ON"
    } else {
        "OFF"
    }
}
