//! Ingestion routes: submit an episode and read job logs.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use recall_core::types::IngestRequest;

use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct IngestAccepted {
    pub id: Uuid,
}

/// `POST /ingest`: validate, create the PENDING entry, enqueue, return the id
#[instrument(skip_all, fields(user_id = %auth.user_id))]
pub async fn submit(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(mut request): Json<IngestRequest>,
) -> Result<Json<IngestAccepted>, ApiError> {
    // The owning user rides in the request metadata so queue recovery can
    // route the job after a restart
    request.metadata.insert(
        "userId".to_string(),
        Value::String(auth.user_id.clone()),
    );

    let id = state
        .queue
        .submit(&auth.user_id, &auth.workspace_id, request)
        .await?;
    Ok(Json(IngestAccepted { id }))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    20
}

#[derive(Debug, Serialize)]
pub struct LogsPage {
    pub entries: Vec<LogEntry>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: Uuid,
    pub status: String,
    pub space_id: Option<Uuid>,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<recall_core::IngestionQueueEntry> for LogEntry {
    fn from(entry: recall_core::IngestionQueueEntry) -> Self {
        Self {
            id: entry.id,
            status: entry.status.to_string(),
            space_id: entry.space_id,
            output: entry.output,
            error: entry.error,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        }
    }
}

/// `GET /ingest/logs?page&limit`: workspace-scoped, newest first
#[instrument(skip_all, fields(workspace_id = %auth.workspace_id))]
pub async fn list_logs(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsPage>, ApiError> {
    let page = state
        .jobs
        .list_entries(&auth.workspace_id, query.page, query.limit)
        .await?;
    Ok(Json(LogsPage {
        entries: page.entries.into_iter().map(LogEntry::from).collect(),
        total: page.total,
        page: page.page,
        limit: page.limit,
    }))
}

/// `GET /ingest/logs/{id}`: one entry with status, output, error
#[instrument(skip_all, fields(entry_id = %id))]
pub async fn get_log(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<LogEntry>, ApiError> {
    let entry = state
        .jobs
        .get_entry(id)
        .await?
        .filter(|entry| entry.workspace_id == auth.workspace_id)
        .ok_or_else(|| ApiError::not_found(format!("ingestion log {id} not found")))?;
    Ok(Json(entry.into()))
}
