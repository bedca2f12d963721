//! Relational store for externally visible ingestion job records.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::types::IngestionQueueEntry;

/// One page of queue entries, newest first
#[derive(Debug, Clone)]
pub struct JobPage {
    pub entries: Vec<IngestionQueueEntry>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

/// Durable record of every ingestion job.
///
/// Entries are created `PENDING` before the broker sees the job, moved to
/// `PROCESSING` when a worker picks it up, and finalized exactly once.
/// Implementations must reject illegal status transitions.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_entry(&self, entry: &IngestionQueueEntry) -> Result<()>;

    /// `PENDING → PROCESSING`
    async fn mark_processing(&self, id: Uuid) -> Result<()>;

    /// `PROCESSING → COMPLETED` with the pipeline output
    async fn complete(&self, id: Uuid, output: Value) -> Result<()>;

    /// `PROCESSING → FAILED` (also accepts `PENDING → FAILED` for jobs
    /// cancelled before a worker ever saw them)
    async fn fail(&self, id: Uuid, error: &str) -> Result<()>;

    async fn get_entry(&self, id: Uuid) -> Result<Option<IngestionQueueEntry>>;

    /// Workspace-scoped listing, newest first, 1-based page
    async fn list_entries(&self, workspace_id: &str, page: u64, limit: u64) -> Result<JobPage>;

    /// PENDING entries in creation order, for startup recovery
    async fn pending_entries(&self) -> Result<Vec<IngestionQueueEntry>>;
}
