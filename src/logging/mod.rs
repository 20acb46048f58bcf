//! # Logging Module
//!
//! Append-only files written per session.
//!
//! This module handles:
//! - The CSV track log of enriched records (one header per file)
//! - The free-text diagnostic trail
//! - The periodic battery log
//! - Local-time formatting shared by all of them
//! - Process-wide `tracing` output
//!
//! Every writer opens its file in append mode for each write, so a crash
//! never leaves a file in a state a later process cannot append to.

pub mod battery_log;
pub mod diagnostic;
pub mod process;
pub mod record_log;

pub use battery_log::BatteryLog;
pub use diagnostic::DiagnosticLog;
pub use process::{init_tracing, TracingGuard};
pub use record_log::{RecordLog, CSV_HEADER};

use std::path::Path;

use chrono::{Local, TimeZone};

/// Formats epoch milliseconds as `yyyy-MM-dd HH:mm:ss` in local time
///
/// # Examples
///
/// ```
/// use geotrail::logging::format_timestamp;
///
/// let text = format_timestamp(1_700_000_000_000);
/// assert_eq!(text.len(), 19);
/// ```
#[must_use]
pub fn format_timestamp(ms: i64) -> String {
    format_local(ms, "%Y-%m-%d %H:%M:%S")
}

/// Formats epoch milliseconds as `yyyyMMdd_HHmmss` for file names
#[must_use]
pub fn file_stamp(ms: i64) -> String {
    format_local(ms, "%Y%m%d_%H%M%S")
}

/// File name stem for a session starting at `started_at_ms`
///
/// Normally the [`file_stamp`] of the start time. When a track or trail
/// file with that stamp already exists in `dir`, a `_1`, `_2`, ... suffix is
/// added until both names are free.
#[must_use]
pub fn session_stem(dir: &Path, started_at_ms: i64) -> String {
    let stamp = file_stamp(started_at_ms);
    let taken = |stem: &str| {
        dir.join(format!("track_{}.csv", stem)).exists()
            || dir.join(format!("debug_{}.log", stem)).exists()
    };

    if !taken(&stamp) {
        return stamp;
    }

    let mut n = 1;
    loop {
        let stem = format!("{}_{}", stamp, n);
        if !taken(&stem) {
            return stem;
        }
        n += 1;
    }
}

fn format_local(ms: i64, pattern: &str) -> String {
    match Local.timestamp_millis_opt(ms).earliest() {
        Some(time) => time.format(pattern).to_string(),
        None => ms.to_string(),
    }
}
