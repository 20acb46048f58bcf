//! Per-session diagnostic trail.
//!
//! Free-text lines of the form `yyyy-MM-dd HH:mm:ss: message`, mirrored to
//! `tracing` at debug level. A failed write is reported through `tracing`
//! and otherwise ignored.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::format_timestamp;

#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    path: PathBuf,
}

impl DiagnosticLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Trail for `debug_<stem>.log` in `dir`
    pub fn for_session(dir: &Path, stem: &str) -> Self {
        Self::new(dir.join(format!("debug_{}.log", stem)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one line stamped with `now_ms`
    pub fn record(&self, now_ms: i64, message: &str) {
        debug!(target: "geotrail::trail", "{}", message);

        let line = format!("{}: {}\n", format_timestamp(now_ms), message);
        if let Err(e) = self.write_line(&line) {
            warn!("Failed to write diagnostic trail {}: {}", self.path.display(), e);
        }
    }

    fn write_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?
            .write_all(line.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lines_are_timestamped_and_appended() {
        let dir = TempDir::new().unwrap();
        let trail = DiagnosticLog::new(dir.path().join("debug.log"));

        trail.record(1_700_000_000_000, "first");
        trail.record(1_700_000_001_000, "second");

        let contents = fs::read_to_string(trail.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], format!("{}: first", format_timestamp(1_700_000_000_000)));
        assert!(lines[1].ends_with(": second"));
    }

    #[test]
    fn test_write_failure_does_not_panic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("debug.log");
        fs::create_dir(&path).unwrap();

        DiagnosticLog::new(&path).record(0, "dropped");
    }

    #[test]
    fn test_session_file_name() {
        let trail = DiagnosticLog::for_session(Path::new("/tmp/logs"), "20240501_120000_1");
        assert_eq!(trail.path(), Path::new("/tmp/logs/debug_20240501_120000_1.log"));
    }
}
