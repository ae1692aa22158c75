use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime, parse_optional_datetime, parse_table},
};
use crate::sinks::{SyncOptions, Table};

/// A queued request for the external syncer to push a table upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub id: i64,
    pub table: Table,
    pub options: SyncOptions,
    pub requested_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

fn row_to_request(row: &Row) -> Result<SyncRequest> {
    let table: String = row.get("table_name")?;
    let remove_after_sync: bool = row.get("remove_after_sync")?;
    let requested_at: String = row.get("requested_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;

    Ok(SyncRequest {
        id: row.get("id")?,
        table: parse_table(&table)?,
        options: SyncOptions { remove_after_sync },
        requested_at: parse_datetime(&requested_at, "requested_at")?,
        completed_at: parse_optional_datetime(completed_at, "completed_at")?,
    })
}

impl Database {
    pub async fn insert_sync_request(&self, table: Table, options: SyncOptions) -> Result<i64> {
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO sync_requests (table_name, remove_after_sync, requested_at)
                 VALUES (?1, ?2, ?3)",
                params![
                    table.as_str(),
                    options.remove_after_sync,
                    format_datetime(&Utc::now()),
                ],
            )
            .context("failed to queue sync request")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn pending_sync_requests(&self) -> Result<Vec<SyncRequest>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, table_name, remove_after_sync, requested_at, completed_at
                 FROM sync_requests
                 WHERE completed_at IS NULL
                 ORDER BY id ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut requests = Vec::new();
            while let Some(row) = rows.next()? {
                requests.push(row_to_request(row)?);
            }
            Ok(requests)
        })
        .await
    }

    pub async fn complete_sync_request(&self, id: i64) -> Result<()> {
        self.execute(move |conn| {
            conn.execute(
                "UPDATE sync_requests SET completed_at = ?1 WHERE id = ?2",
                params![format_datetime(&Utc::now()), id],
            )
            .context("failed to complete sync request")?;
            Ok(())
        })
        .await
    }
}
