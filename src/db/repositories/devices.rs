use anyhow::{Context, Result};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime},
};
use crate::models::DeviceDescriptor;

fn row_to_device(row: &Row) -> Result<DeviceDescriptor> {
    let timestamp: String = row.get("timestamp")?;
    Ok(DeviceDescriptor {
        device_id: row.get("device_id")?,
        timestamp: parse_datetime(&timestamp, "timestamp")?,
        max_range: row.get("max_range")?,
        min_delay: row.get("min_delay")?,
        name: row.get("name")?,
        power: row.get("power")?,
        resolution: row.get("resolution")?,
        sensor_type: row.get("sensor_type")?,
        vendor: row.get("vendor")?,
        version: row.get("version")?,
        json_version: row.get("json_version")?,
    })
}

impl Database {
    pub async fn insert_device(&self, device: DeviceDescriptor) -> Result<()> {
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO rotation_device (
                    device_id,
                    timestamp,
                    max_range,
                    min_delay,
                    name,
                    power,
                    resolution,
                    sensor_type,
                    vendor,
                    version,
                    json_version
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    device.device_id,
                    format_datetime(&device.timestamp),
                    device.max_range,
                    device.min_delay,
                    device.name,
                    device.power,
                    device.resolution,
                    device.sensor_type,
                    device.vendor,
                    device.version,
                    device.json_version,
                ],
            )
            .context("failed to insert device descriptor")?;
            Ok(())
        })
        .await
    }

    /// Device snapshots, newest first.
    pub async fn get_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT device_id, timestamp, max_range, min_delay, name, power, resolution,
                        sensor_type, vendor, version, json_version
                 FROM rotation_device
                 ORDER BY id DESC",
            )?;
            let mut rows = stmt.query([])?;
            let mut devices = Vec::new();
            while let Some(row) = rows.next()? {
                devices.push(row_to_device(row)?);
            }
            Ok(devices)
        })
        .await
    }
}
