//! # Geotrail Library
//!
//! Unattended position recording with adaptive sampling.
//!
//! This library provides the polling scheduler that keeps a subscription to
//! a push-based positioning source alive, recovers from silent stalls and
//! degraded fixes, and turns irregular samples into a throttled, append-only
//! CSV track log.

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod power;
pub mod preferences;
pub mod profile;
pub mod record;
pub mod scheduler;
pub mod source;
pub mod state;
