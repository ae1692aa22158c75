use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Static capability snapshot of the rotation sensor, written once per
/// sampling session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub max_range: f32,
    pub min_delay: f32,
    pub name: String,
    /// Power draw in mA.
    pub power: f32,
    pub resolution: f32,
    pub sensor_type: String,
    pub vendor: String,
    pub version: String,
    pub json_version: i32,
}
