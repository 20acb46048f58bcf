//! # Position Source Module
//!
//! The live link to the external, push-based positioning source.
//!
//! This module handles:
//! - The [`PositionSource`] capability implemented by concrete sources
//! - Tagging every delivery with the subscription generation it belongs to
//! - Open/close/replace semantics of the [`Subscription`]
//!
//! Sources push into an unbounded channel consumed only by the scheduler,
//! so a delivery never blocks the source. Each `open` starts a new
//! generation; events carrying an older generation arrived after their
//! subscription was closed and are dropped by the consumer.

pub mod gpsd;

pub use gpsd::GpsdSource;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::Result;
use crate::profile::SamplingProfile;
use crate::record::RawSample;

/// Something the positioning source reported
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// A position fix
    Sample(RawSample),
    /// Satellite visibility report
    Satellites { visible: u32, used: u32 },
}

/// An event stamped with the subscription generation that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: SourceEvent,
}

/// Delivery handle given to a source for one subscription
#[derive(Debug, Clone)]
pub struct SampleSink {
    generation: u64,
    events: mpsc::UnboundedSender<TaggedEvent>,
}

impl SampleSink {
    pub fn new(generation: u64, events: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, events }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Pushes an event; returns false once the consumer is gone
    pub fn deliver(&self, event: SourceEvent) -> bool {
        self.events
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    /// True once the consumer has been dropped
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

/// Push-based positioning source
///
/// Implementations must return quickly from both methods: the source may be
/// absent altogether, and the caller holds the scheduler while they run.
#[cfg_attr(test, mockall::automock)]
pub trait PositionSource: Send {
    /// Starts delivering events to `sink` under `profile`
    ///
    /// Called while a previous subscription is still active only after
    /// [`unsubscribe`](Self::unsubscribe).
    fn subscribe(&mut self, profile: &SamplingProfile, sink: SampleSink) -> Result<()>;

    /// Stops delivering events; a no-op when nothing is subscribed
    fn unsubscribe(&mut self);
}

/// Owns the source and the generation counter
pub struct Subscription {
    source: Box<dyn PositionSource>,
    events: mpsc::UnboundedSender<TaggedEvent>,
    generation: u64,
    open: bool,
}

impl Subscription {
    pub fn new(source: Box<dyn PositionSource>, events: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self {
            source,
            events,
            generation: 0,
            open: false,
        }
    }

    /// Opens under `profile`, replacing any open subscription
    ///
    /// # Errors
    ///
    /// Returns the source's error; the subscription is then closed.
    pub fn open(&mut self, profile: &SamplingProfile) -> Result<()> {
        self.close();

        self.generation += 1;
        let sink = SampleSink::new(self.generation, self.events.clone());
        self.source.subscribe(profile, sink)?;
        self.open = true;

        debug!(generation = self.generation, mode = %profile.mode, "Subscription opened");
        Ok(())
    }

    /// Closes the subscription; safe to call when never opened
    pub fn close(&mut self) {
        if !self.open {
            return;
        }

        self.source.unsubscribe();
        self.open = false;
        // Anything still in flight from the closed generation is now stale
        self.generation += 1;
        debug!(generation = self.generation, "Subscription closed");
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True when `generation` belongs to the currently open subscription
    pub fn is_current(&self, generation: u64) -> bool {
        self.open && generation == self.generation
    }
}
