//! Persisted rotation sample.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RawReading, SCHEMA_VERSION};

/// Value stored in `w` when the sensor only reports three components.
pub const NEUTRAL_W: f32 = 0.0;

/// An accepted reading, shaped for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    pub label: Option<String>,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
    pub accuracy: i32,
    pub event_timestamp: i64,
    pub json_version: i32,
}

impl Sample {
    /// Builds a sample from an accepted reading. The label is the one active
    /// at acceptance time.
    pub fn from_reading(reading: &RawReading, device_id: &str, label: Option<&str>) -> Self {
        let [x, y, z] = reading.axes();
        Self {
            timestamp: reading.received_at,
            device_id: device_id.to_string(),
            label: label.map(str::to_string),
            x,
            y,
            z,
            w: reading.w().unwrap_or(NEUTRAL_W),
            accuracy: reading.accuracy,
            event_timestamp: reading.event_timestamp,
            json_version: SCHEMA_VERSION,
        }
    }
}
