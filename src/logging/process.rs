//! Process-wide `tracing` setup.
//!
//! Events go to stdout and to a daily rolling `geotrail.log` in the log
//! directory. The filter comes from `RUST_LOG` and defaults to `info`.

use std::fs;
use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// File name prefix of the process log
pub const PROCESS_LOG_FILE: &str = "geotrail.log";

/// Keeps the non-blocking file writer alive
///
/// Dropping it flushes and closes the process log.
pub struct TracingGuard {
    _file_guard: WorkerGuard,
}

/// Installs the global subscriber
///
/// # Errors
///
/// Returns error if the log directory cannot be created
pub fn init_tracing(log_dir: &Path) -> io::Result<TracingGuard> {
    fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, PROCESS_LOG_FILE);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_target(false);

    tracing_subscriber::registry()
        .with(default_filter())
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(TracingGuard {
        _file_guard: file_guard,
    })
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
