//! Type definitions for the fare prediction pipeline

pub mod result;
pub mod ride;

pub use result::{BatchOutcome, ScoringResult};
pub use ride::RideEvent;

/// One newline-delimited record exactly as received from the feed
pub type RawRecord = Vec<u8>;
