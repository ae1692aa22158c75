use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::db::connection::Database;
use crate::models::{DeviceDescriptor, Sample};
use crate::sinks::{PersistenceSink, SyncOptions, Table};

#[async_trait]
impl PersistenceSink for Database {
    async fn save_one(&self, device: DeviceDescriptor, table: Table) -> Result<()> {
        match table {
            Table::RotationDevice => self.insert_device(device).await,
            other => bail!("device descriptors cannot be stored in {}", other.as_str()),
        }
    }

    async fn save_batch(&self, samples: Vec<Sample>, table: Table) -> Result<()> {
        match table {
            Table::RotationData => self.insert_samples(samples).await.map(|_| ()),
            other => bail!("samples cannot be stored in {}", other.as_str()),
        }
    }

    async fn request_sync(&self, table: Table, options: SyncOptions) -> Result<()> {
        self.insert_sync_request(table, options).await.map(|_| ())
    }
}
