use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime},
};
use crate::models::Sample;

fn row_to_sample(row: &Row) -> Result<Sample> {
    let timestamp: String = row.get("timestamp")?;
    Ok(Sample {
        timestamp: parse_datetime(&timestamp, "timestamp")?,
        device_id: row.get("device_id")?,
        label: row.get("label")?,
        x: row.get("x")?,
        y: row.get("y")?,
        z: row.get("z")?,
        w: row.get("w")?,
        accuracy: row.get("accuracy")?,
        event_timestamp: row.get("event_timestamp")?,
        json_version: row.get("json_version")?,
    })
}

impl Database {
    /// Inserts a flushed batch in one transaction; either every sample lands
    /// or none does.
    pub async fn insert_samples(&self, samples: Vec<Sample>) -> Result<usize> {
        if samples.is_empty() {
            return Ok(0);
        }
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open sample batch transaction")?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO rotation_data (
                        timestamp,
                        device_id,
                        label,
                        x, y, z, w,
                        accuracy,
                        event_timestamp,
                        json_version
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )?;
                for sample in &samples {
                    stmt.execute(params![
                        format_datetime(&sample.timestamp),
                        sample.device_id,
                        sample.label,
                        sample.x,
                        sample.y,
                        sample.z,
                        sample.w,
                        sample.accuracy,
                        sample.event_timestamp,
                        sample.json_version,
                    ])
                    .context("failed to insert rotation sample")?;
                }
            }
            tx.commit().context("failed to commit sample batch")?;
            Ok(samples.len())
        })
        .await
    }

    /// Samples at or after `since`, in insertion order.
    pub async fn get_samples_since(&self, since: DateTime<Utc>) -> Result<Vec<Sample>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, device_id, label, x, y, z, w, accuracy, event_timestamp, json_version
                 FROM rotation_data
                 WHERE timestamp >= ?1
                 ORDER BY id ASC",
            )?;
            let mut rows = stmt.query(params![format_datetime(&since)])?;
            let mut samples = Vec::new();
            while let Some(row) = rows.next()? {
                samples.push(row_to_sample(row)?);
            }
            Ok(samples)
        })
        .await
    }

    pub async fn count_samples(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM rotation_data", [], |row| row.get(0))?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
        .await
    }
}
