//! Sensor-side collaborators: the handle the sampler subscribes to, plus two
//! adapters (a push-fed channel sensor and a synthetic source).

mod channel;
mod simulated;

pub use channel::ChannelSensor;
pub use simulated::SimulatedRotationSensor;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::models::RawReading;

/// Android-compatible numeric code for a rotation vector sensor.
pub const TYPE_ROTATION_VECTOR: i32 = 11;

/// Static metadata reported by the sensor hardware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCapabilities {
    pub name: String,
    pub vendor: String,
    pub version: i32,
    pub sensor_type: i32,
    pub max_range: f32,
    pub resolution: f32,
    /// mA
    pub power: f32,
    /// Minimum delay between events in microseconds.
    pub min_delay_us: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Live event delivery from a sensor. The stream ends (receiver yields
/// `None`) when the sensor stops delivering.
pub struct Subscription {
    pub id: SubscriptionId,
    pub readings: mpsc::Receiver<RawReading>,
}

pub trait SensorHandle: Send + Sync {
    fn capabilities(&self) -> DeviceCapabilities;

    /// Starts delivery at roughly `rate_hz` events per second; 0 asks for the
    /// fastest rate the hardware supports.
    fn subscribe(&self, rate_hz: u32) -> Result<Subscription>;

    fn unsubscribe(&self, id: SubscriptionId);
}
