//! # Record Module
//!
//! Position samples as delivered by the source, the session they belong to,
//! and the enriched records that end up in the durable log.
//!
//! This module handles:
//! - Raw sample and session types
//! - Source-quality classification
//! - Enrichment of a raw sample into a log record

pub mod enricher;
pub mod types;

pub use enricher::{classify_source, enrich, KMH_PER_MPS, STATIONARY_SPEED_MPS};
pub use types::{EnrichedRecord, RawSample, Session, SourceQuality};
