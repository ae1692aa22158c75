use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::error::{SamplerError, SamplerResult};
use crate::models::{DeviceDescriptor, SCHEMA_VERSION};
use crate::sensor::SensorHandle;
use crate::sinks::{PersistenceSink, Table};

/// Snapshot of the sensor's static capabilities. Fails with
/// `NoHardwareAvailable` when there is no sensor to describe, which is what
/// keeps a session from starting on hardware without a rotation sensor.
pub fn describe_sensor(
    sensor: Option<&dyn SensorHandle>,
    device_id: &str,
    now: DateTime<Utc>,
) -> SamplerResult<DeviceDescriptor> {
    let sensor = sensor.ok_or(SamplerError::NoHardwareAvailable)?;
    let caps = sensor.capabilities();

    Ok(DeviceDescriptor {
        device_id: device_id.to_string(),
        timestamp: now,
        max_range: caps.max_range,
        min_delay: caps.min_delay_us as f32,
        name: caps.name,
        power: caps.power,
        resolution: caps.resolution,
        sensor_type: caps.sensor_type.to_string(),
        vendor: caps.vendor,
        version: caps.version.to_string(),
        json_version: SCHEMA_VERSION,
    })
}

/// Writes the descriptor straight to storage, bypassing the sample buffer.
/// A storage failure is logged and does not block the session.
pub async fn persist_descriptor(sink: &dyn PersistenceSink, descriptor: DeviceDescriptor) {
    let summary = format!(
        "{} ({}, type {}, min delay {}us)",
        descriptor.name, descriptor.vendor, descriptor.sensor_type, descriptor.min_delay
    );
    match sink.save_one(descriptor, Table::RotationDevice).await {
        Ok(()) => info!("Rotation sensor info: {summary}"),
        Err(err) => warn!("failed to persist rotation sensor info {summary}: {err:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{SimulatedRotationSensor, TYPE_ROTATION_VECTOR};

    #[test]
    fn missing_sensor_is_no_hardware() {
        assert!(matches!(
            describe_sensor(None, "device-a", Utc::now()),
            Err(SamplerError::NoHardwareAvailable)
        ));
    }

    #[test]
    fn copies_capabilities() {
        let sensor = SimulatedRotationSensor::new();
        let now = Utc::now();
        let descriptor = describe_sensor(Some(&sensor as &dyn SensorHandle), "device-a", now).unwrap();

        assert_eq!(descriptor.device_id, "device-a");
        assert_eq!(descriptor.timestamp, now);
        assert_eq!(descriptor.sensor_type, TYPE_ROTATION_VECTOR.to_string());
        assert_eq!(descriptor.min_delay, 5_000.0);
        assert_eq!(descriptor.json_version, SCHEMA_VERSION);
    }
}
