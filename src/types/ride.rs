//! Ride event data structures

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Wire schema version understood by the parser
pub const SCHEMA_VERSION: u32 = 1;

/// One observed ride, as decoded from the event feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideEvent {
    /// Ride identifier (`ride_id` on the wire)
    #[serde(rename = "ride_id", alias = "id")]
    pub id: String,

    /// When the ride was reported
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,

    /// Distance travelled in kilometres
    pub distance_km: f64,

    /// Fare reported by the producer
    pub fare_amount: f64,

    /// Producer schema version; absent means version 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
}

impl RideEvent {
    /// Create a ride event stamped with the current time
    pub fn new(id: impl Into<String>, distance_km: f64, fare_amount: f64) -> Self {
        Self {
            id: id.into(),
            timestamp: Utc::now(),
            distance_km,
            fare_amount,
            schema_version: None,
        }
    }
}

/// Accepts RFC 3339 or `YYYY-MM-DD HH:MM:SS[.fff]` (taken as UTC)
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp `{raw}`")))
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_timestamp_formats() {
        let rfc = parse_timestamp("2025-10-15T08:30:00Z").unwrap();
        let naive = parse_timestamp("2025-10-15 08:30:00").unwrap();
        assert_eq!(rfc, naive);

        let fractional = parse_timestamp("2025-10-15 08:30:00.250").unwrap();
        assert_eq!(fractional.nanosecond(), 250_000_000);

        assert!(parse_timestamp("15/10/2025").is_none());
    }

    #[test]
    fn test_ride_id_alias() {
        let json = r#"{"id":"A1","timestamp":"2025-10-15 08:30:00","distance_km":3.0,"fare_amount":8.0}"#;
        let event: RideEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.id, "A1");
        assert_eq!(event.schema_version, None);

        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded["ride_id"], "A1");
    }
}
