//! Relational ingestion queue entries with guarded status transitions.

use async_trait::async_trait;
use chrono::Utc;
use libsql::params;
use recall_core::graph::{JobPage, JobStore};
use recall_core::types::IngestionQueueEntry;
use recall_core::{Error, Result};
use serde_json::Value;
use uuid::Uuid;

use crate::rows::{row_to_queue_entry, storage_err};
use crate::TursoGraphStore;

const QUEUE_COLUMNS: &str =
    "id, workspace_id, space_id, priority, data, output, error, status, created_at, updated_at";

impl TursoGraphStore {
    /// Guarded status transition; errors when the current status does not
    /// allow it.
    async fn transition(
        &self,
        id: Uuid,
        from: &[&str],
        to: &str,
        output: Option<String>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self.connect()?;
        let from_list = from
            .iter()
            .map(|s| format!("'{s}'"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE ingestion_queue
             SET status = ?, output = COALESCE(?, output), error = COALESCE(?, error), updated_at = ?
             WHERE id = ? AND status IN ({from_list})"
        );
        let changed = conn
            .execute(
                &sql,
                params![
                    to,
                    output,
                    error_message,
                    Utc::now().timestamp_millis(),
                    id.to_string(),
                ],
            )
            .await
            .map_err(storage_err)?;
        if changed == 0 {
            return Err(Error::InvalidState(format!(
                "queue entry {id} not in {from:?}; cannot move to {to}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for TursoGraphStore {
    async fn create_entry(&self, entry: &IngestionQueueEntry) -> Result<()> {
        let conn = self.connect()?;
        let sql = format!(
            "INSERT INTO ingestion_queue ({QUEUE_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        conn.execute(
            &sql,
            params![
                entry.id.to_string(),
                entry.workspace_id.clone(),
                entry.space_id.map(|id| id.to_string()),
                i64::from(entry.priority),
                serde_json::to_string(&entry.data).map_err(Error::Serialization)?,
                entry
                    .output
                    .as_ref()
                    .map(|v| serde_json::to_string(v))
                    .transpose()
                    .map_err(Error::Serialization)?,
                entry.error.clone(),
                entry.status.to_string(),
                entry.created_at.timestamp_millis(),
                entry.updated_at.timestamp_millis(),
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to create queue entry: {e}")))?;
        Ok(())
    }

    async fn mark_processing(&self, id: Uuid) -> Result<()> {
        self.transition(id, &["PENDING"], "PROCESSING", None, None)
            .await
    }

    async fn complete(&self, id: Uuid, output: Value) -> Result<()> {
        let output_json = serde_json::to_string(&output).map_err(Error::Serialization)?;
        self.transition(id, &["PROCESSING"], "COMPLETED", Some(output_json), None)
            .await
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<()> {
        // PENDING → FAILED covers jobs cancelled before any worker ran them
        self.transition(id, &["PENDING", "PROCESSING"], "FAILED", None, Some(error))
            .await
    }

    async fn get_entry(&self, id: Uuid) -> Result<Option<IngestionQueueEntry>> {
        let conn = self.connect()?;
        let sql = format!("SELECT {QUEUE_COLUMNS} FROM ingestion_queue WHERE id = ?");
        let mut rows = conn
            .query(&sql, params![id.to_string()])
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_queue_entry(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_entries(&self, workspace_id: &str, page: u64, limit: u64) -> Result<JobPage> {
        let conn = self.connect()?;
        let page = page.max(1);
        let limit = limit.clamp(1, 200);

        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM ingestion_queue WHERE workspace_id = ?",
                params![workspace_id],
            )
            .await
            .map_err(storage_err)?;
        let total: i64 = match rows.next().await.map_err(storage_err)? {
            Some(row) => row.get(0).map_err(storage_err)?,
            None => 0,
        };

        let sql = format!(
            "SELECT {QUEUE_COLUMNS} FROM ingestion_queue
             WHERE workspace_id = ?
             ORDER BY created_at DESC
             LIMIT ? OFFSET ?"
        );
        let offset = (page - 1) * limit;
        let mut rows = conn
            .query(&sql, params![workspace_id, limit as i64, offset as i64])
            .await
            .map_err(storage_err)?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            entries.push(row_to_queue_entry(&row)?);
        }

        Ok(JobPage {
            entries,
            total: total.max(0) as u64,
            page,
            limit,
        })
    }

    async fn pending_entries(&self) -> Result<Vec<IngestionQueueEntry>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {QUEUE_COLUMNS} FROM ingestion_queue
             WHERE status = 'PENDING'
             ORDER BY created_at ASC"
        );
        let mut rows = conn.query(&sql, ()).await.map_err(storage_err)?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            entries.push(row_to_queue_entry(&row)?);
        }
        Ok(entries)
    }
}
