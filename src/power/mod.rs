//! # Power Module
//!
//! Host capabilities the recorder consumes but does not own.
//!
//! This module handles:
//! - Reading the battery percentage
//! - Holding a wake lock for the life of the process
//! - Announcing that background work is ongoing

pub mod battery;
pub mod presence;
pub mod wake_lock;

pub use battery::{BatteryGauge, SysfsBattery, UNKNOWN_BATTERY_LEVEL};
pub use presence::{Presence, TracingPresence};
pub use wake_lock::{InhibitorLock, NoopWakeLock, WakeGuard, WakeLock};
