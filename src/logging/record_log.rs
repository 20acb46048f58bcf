//! # Track Log
//!
//! CSV log of enriched records, one file per session.
//!
//! ## Format
//!
//! ```text
//! timestamp,latitude,longitude,altitude,accuracy,speed_kmh,bearing,source,isMock,batteryLevel,sampleAgeMs,isStationary,sessionId,sourceQuality,profile
//! 2024-05-01 12:00:00,35.681236,139.767125,40,8.5,7.200,90,/dev/ttyACM0,false,87,412,false,1b4e28ba-2fa1-11d2-883f-0016d3cca427,GPS,NORMAL
//! ```
//!
//! The header is written when the file is empty on disk, so reopening the
//! same file after a restart never duplicates it.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::format_timestamp;
use crate::error::Result;
use crate::record::EnrichedRecord;

/// Header row of every track log
pub const CSV_HEADER: &str = "timestamp,latitude,longitude,altitude,accuracy,speed_kmh,bearing,source,isMock,batteryLevel,sampleAgeMs,isStationary,sessionId,sourceQuality,profile";

/// Number of columns in a track log row
pub const CSV_FIELD_COUNT: usize = 15;

/// Append-only writer for one session's track log
#[derive(Debug, Clone)]
pub struct RecordLog {
    path: PathBuf,
}

impl RecordLog {
    /// Writer for an explicit file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Writer for `track_<stem>.csv` in `dir`
    ///
    /// `stem` comes from [`session_stem`](super::session_stem).
    pub fn for_session(dir: &Path, stem: &str) -> Self {
        Self::new(dir.join(format!("track_{}.csv", stem)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record, writing the header first if the file is empty
    ///
    /// The header and row go out in a single write call.
    ///
    /// # Errors
    ///
    /// Returns error if the directory or file cannot be created or written.
    /// Nothing is retried; the caller decides whether to drop the record.
    pub fn append(&self, record: &EnrichedRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let needs_header = file.metadata()?.len() == 0;

        let mut buffer = Vec::with_capacity(256);
        if needs_header {
            buffer.extend_from_slice(CSV_HEADER.as_bytes());
            buffer.push(b'\n');
        }
        buffer.extend_from_slice(&encode_row(record)?);

        file.write_all(&buffer)?;
        debug!("Appended record to {}", self.path.display());
        Ok(())
    }
}

/// Encodes one record as a newline-terminated CSV row
fn encode_row(record: &EnrichedRecord) -> Result<Vec<u8>> {
    let sample = &record.sample;
    let fields: [String; CSV_FIELD_COUNT] = [
        format_timestamp(sample.timestamp_ms),
        sample.latitude.to_string(),
        sample.longitude.to_string(),
        sample.altitude.to_string(),
        sample.accuracy.to_string(),
        format!("{:.3}", record.speed_kmh),
        sample.bearing.to_string(),
        sanitize(&sample.source),
        sample.is_mock.to_string(),
        record.battery_level.to_string(),
        record.sample_age_ms.to_string(),
        record.is_stationary.to_string(),
        record.session_id.clone(),
        record.source_quality.to_string(),
        record.profile.to_string(),
    ];

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::with_capacity(256));
    writer.write_record(&fields).map_err(std::io::Error::from)?;
    Ok(writer.into_inner().map_err(|e| e.into_error())?)
}

/// Keeps free-text fields from adding columns or rows
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            ',' => ';',
            '\n' | '\r' | '"' => ' ',
            other => other,
        })
        .collect()
}
