//! Decoding and validation of raw ride records

use crate::types::ride::{RideEvent, SCHEMA_VERSION};
use thiserror::Error;

/// Why a raw record was rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseFailure {
    /// Not valid JSON, wrong types, or a required field is missing
    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("field `{field}` must be a finite non-negative number, got {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("unsupported schema version {0}")]
    UnsupportedVersion(u32),
}

/// Turns one newline-delimited JSON record into a validated [`RideEvent`].
///
/// Parsing is pure: the same bytes always give the same outcome, and a
/// rejected record never yields a partially populated event.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordParser;

impl RecordParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, raw: &[u8]) -> Result<RideEvent, ParseFailure> {
        let event: RideEvent =
            serde_json::from_slice(raw).map_err(|e| ParseFailure::Malformed(e.to_string()))?;

        if let Some(version) = event.schema_version {
            if version != SCHEMA_VERSION {
                return Err(ParseFailure::UnsupportedVersion(version));
            }
        }

        check_amount("distance_km", event.distance_km)?;
        check_amount("fare_amount", event.fare_amount)?;

        Ok(event)
    }
}

fn check_amount(field: &'static str, value: f64) -> Result<(), ParseFailure> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ParseFailure::OutOfRange { field, value })
    }
}
