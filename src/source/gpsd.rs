//! # gpsd Source
//!
//! Streams position reports from a local gpsd daemon.
//!
//! ## Protocol
//!
//! After connecting, the client enables JSON watch mode:
//!
//! ```text
//! ?WATCH={"enable":true,"json":true};
//! ```
//!
//! gpsd then pushes one JSON object per line. Two classes are used:
//!
//! - `TPV`: time/position/velocity. Becomes a [`RawSample`] when it carries a
//!   2D or 3D fix with latitude and longitude.
//! - `SKY`: satellite view. Becomes a satellite count event.
//!
//! ## Profiles
//!
//! gpsd has no per-client rate or accuracy setting, so the profile is applied
//! on the client side: fixes closer than the profile's minimum interval to
//! the last delivered fix are skipped, and profiles that wait for an accurate
//! fix skip anything below a 3D fix.
//!
//! ## Connection
//!
//! `subscribe` connects before returning, blocking for at most the connect
//! timeout, so a missing daemon fails the subscription. Connection loss
//! afterwards ends the stream task with a warning. Nothing reconnects here;
//! the scheduler's gap watchdog re-subscribes.

use std::net::ToSocketAddrs;
use std::time::Duration;

use chrono::DateTime;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{PositionSource, SampleSink, SourceEvent};
use crate::error::{GeotrailError, Result};
use crate::profile::SamplingProfile;
use crate::record::RawSample;

/// Enables JSON reports on a gpsd connection
pub const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true};\n";

/// Accuracy reported when gpsd gives no error estimate
pub const UNKNOWN_ACCURACY_M: f32 = 9999.0;

/// Source tag used when a report names no device
const DEFAULT_SOURCE_TAG: &str = "gpsd";

/// gpsd NMEA mode values
const MODE_2D: u8 = 2;
const MODE_3D: u8 = 3;

/// Position source backed by a gpsd TCP connection
pub struct GpsdSource {
    addr: String,
    connect_timeout: Duration,
    active: Option<CancellationToken>,
}

impl std::fmt::Debug for GpsdSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpsdSource")
            .field("addr", &self.addr)
            .field("subscribed", &self.active.is_some())
            .finish_non_exhaustive()
    }
}

impl GpsdSource {
    /// Creates a source for the gpsd daemon at `addr` (e.g. `127.0.0.1:2947`)
    pub fn new(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
            active: None,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl PositionSource for GpsdSource {
    /// Connects to gpsd, then spawns the stream task
    ///
    /// # Errors
    ///
    /// Returns `SourceUnavailable` when called outside a Tokio runtime or
    /// when gpsd cannot be reached within the connect timeout.
    fn subscribe(&mut self, profile: &SamplingProfile, sink: SampleSink) -> Result<()> {
        self.unsubscribe();

        let runtime = Handle::try_current()
            .map_err(|e| GeotrailError::SourceUnavailable(format!("no async runtime: {}", e)))?;

        let stream = {
            let _guard = runtime.enter();
            TcpStream::from_std(connect(&self.addr, self.connect_timeout)?)?
        };
        info!("Connected to gpsd at {} (profile {})", self.addr, profile.mode);

        let token = CancellationToken::new();
        let task_token = token.clone();
        let addr = self.addr.clone();
        let profile = profile.clone();

        runtime.spawn(async move {
            match stream_reports(stream, &profile, &sink, &task_token).await {
                Ok(()) => debug!("gpsd stream from {} finished", addr),
                Err(e) => warn!("gpsd stream from {} stopped: {}", addr, e),
            }
        });

        self.active = Some(token);
        Ok(())
    }

    fn unsubscribe(&mut self) {
        if let Some(token) = self.active.take() {
            token.cancel();
        }
    }
}

impl Drop for GpsdSource {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Opens a non-blocking connection to `addr`, trying each resolved address
///
/// # Errors
///
/// Returns `SourceUnavailable` if no address accepts within `timeout`.
fn connect(addr: &str, timeout: Duration) -> Result<std::net::TcpStream> {
    let unavailable =
        |reason: String| GeotrailError::SourceUnavailable(format!("cannot connect to {}: {}", addr, reason));

    let candidates = addr.to_socket_addrs().map_err(|e| unavailable(e.to_string()))?;

    let mut last_error = None;
    for candidate in candidates {
        match std::net::TcpStream::connect_timeout(&candidate, timeout) {
            Ok(stream) => {
                stream.set_nonblocking(true)?;
                return Ok(stream);
            }
            Err(e) => {
                debug!("gpsd connect to {} failed: {}", candidate, e);
                last_error = Some(e);
            }
        }
    }

    Err(unavailable(last_error.map_or_else(
        || "no addresses resolved".to_string(),
        |e| e.to_string(),
    )))
}

/// Enables watch mode on `stream` and forwards reports to `sink`
///
/// # Errors
///
/// Returns `SourceUnavailable` when gpsd closes the connection and `Io` on
/// read/write failures. Returns `Ok` when cancelled or when the consumer
/// has gone away.
pub async fn stream_reports<S>(
    stream: S,
    profile: &SamplingProfile,
    sink: &SampleSink,
    cancel: &CancellationToken,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    writer.write_all(WATCH_COMMAND).await?;
    writer.flush().await?;

    let mut lines = BufReader::new(reader).lines();
    let mut filter = DeliveryFilter::new(profile);

    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            return Err(GeotrailError::SourceUnavailable("gpsd closed the connection".to_string()));
        };

        let event = match parse_report(&line) {
            Some(Report::Fix { sample, mode }) => {
                if !filter.admit(&sample, mode) {
                    continue;
                }
                SourceEvent::Sample(sample)
            }
            Some(Report::Satellites { visible, used }) => SourceEvent::Satellites { visible, used },
            None => continue,
        };

        if !sink.deliver(event) {
            return Ok(());
        }
    }
}

/// A gpsd report the recorder cares about
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Fix { sample: RawSample, mode: u8 },
    Satellites { visible: u32, used: u32 },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "class")]
enum Message {
    #[serde(rename = "TPV")]
    Tpv(Tpv),
    #[serde(rename = "SKY")]
    Sky(Sky),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Tpv {
    device: Option<String>,
    #[serde(default)]
    mode: u8,
    time: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    #[serde(rename = "altMSL")]
    alt_msl: Option<f64>,
    alt: Option<f64>,
    eph: Option<f64>,
    epx: Option<f64>,
    epy: Option<f64>,
    speed: Option<f64>,
    track: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Sky {
    satellites: Option<Vec<Satellite>>,
    #[serde(rename = "nSat")]
    n_sat: Option<u32>,
    #[serde(rename = "uSat")]
    u_sat: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Satellite {
    #[serde(default)]
    used: bool,
}

/// Parses one gpsd JSON line; returns `None` for anything not usable
pub fn parse_report(line: &str) -> Option<Report> {
    let message: Message = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => {
            debug!("Ignoring malformed gpsd line: {}", e);
            return None;
        }
    };

    match message {
        Message::Tpv(tpv) => tpv_to_fix(tpv),
        Message::Sky(sky) => sky_to_satellites(sky),
        Message::Other => None,
    }
}

fn tpv_to_fix(tpv: Tpv) -> Option<Report> {
    if tpv.mode < MODE_2D {
        return None;
    }

    let timestamp_ms = DateTime::parse_from_rfc3339(tpv.time.as_deref()?)
        .ok()?
        .timestamp_millis();

    let accuracy = tpv
        .eph
        .or_else(|| match (tpv.epx, tpv.epy) {
            (Some(x), Some(y)) => Some(x.max(y)),
            (x, y) => x.or(y),
        })
        .map_or(UNKNOWN_ACCURACY_M, |m| m as f32);

    let sample = RawSample {
        timestamp_ms,
        latitude: tpv.lat?,
        longitude: tpv.lon?,
        altitude: tpv.alt_msl.or(tpv.alt).unwrap_or(0.0),
        accuracy,
        speed: tpv.speed.unwrap_or(0.0) as f32,
        bearing: tpv.track.unwrap_or(0.0) as f32,
        source: tpv.device.unwrap_or_else(|| DEFAULT_SOURCE_TAG.to_string()),
        is_mock: false,
    };

    Some(Report::Fix {
        sample,
        mode: tpv.mode,
    })
}

fn sky_to_satellites(sky: Sky) -> Option<Report> {
    if let Some(satellites) = sky.satellites {
        let used = satellites.iter().filter(|s| s.used).count();
        return Some(Report::Satellites {
            visible: satellites.len() as u32,
            used: used as u32,
        });
    }

    // Newer gpsd may send counts without the per-satellite list
    match (sky.n_sat, sky.u_sat) {
        (Some(visible), used) => Some(Report::Satellites {
            visible,
            used: used.unwrap_or(0),
        }),
        _ => None,
    }
}

/// Applies a sampling profile to the fixes gpsd pushes
#[derive(Debug, Clone)]
pub struct DeliveryFilter {
    min_interval_ms: i64,
    wait_for_accurate: bool,
    last_delivered: Option<i64>,
}

impl DeliveryFilter {
    pub fn new(profile: &SamplingProfile) -> Self {
        Self {
            min_interval_ms: profile.min_interval.as_millis() as i64,
            wait_for_accurate: profile.wait_for_accurate,
            last_delivered: None,
        }
    }

    /// Returns true if the fix should be delivered, recording it if so
    pub fn admit(&mut self, sample: &RawSample, mode: u8) -> bool {
        if self.wait_for_accurate && mode < MODE_3D {
            return false;
        }

        if let Some(last) = self.last_delivered {
            // A fix older than the last one means the receiver clock jumped; accept it
            let elapsed = sample.timestamp_ms - last;
            if elapsed >= 0 && elapsed < self.min_interval_ms {
                return false;
            }
        }

        self.last_delivered = Some(sample.timestamp_ms);
        true
    }
}
