//! Space CRUD and statement assignment routes.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use recall_core::graph::SpaceUpdate;
use recall_core::spaces::CreateSpaceParams;
use recall_core::types::Space;

use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSpaceBody {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSpaceBody {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceView {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Space> for SpaceView {
    fn from(space: Space) -> Self {
        Self {
            id: space.uuid,
            name: space.name,
            description: space.description,
            is_active: space.is_active,
            created_at: space.created_at,
            updated_at: space.updated_at,
        }
    }
}

/// `POST /spaces`
#[instrument(skip_all, fields(workspace_id = %auth.workspace_id))]
pub async fn create(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<CreateSpaceBody>,
) -> Result<Json<SpaceView>, ApiError> {
    let space = state
        .spaces
        .create_space(CreateSpaceParams {
            name: body.name,
            description: body.description,
            user_id: auth.user_id,
            workspace_id: auth.workspace_id,
        })
        .await?;
    Ok(Json(space.into()))
}

/// `GET /spaces`
pub async fn list(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<SpaceView>>, ApiError> {
    let spaces = state.spaces.list_spaces(&auth.workspace_id).await?;
    Ok(Json(spaces.into_iter().map(SpaceView::from).collect()))
}

/// `GET /spaces/{id}`
pub async fn get(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<SpaceView>, ApiError> {
    let space = state
        .spaces
        .get_space(id)
        .await?
        .filter(|space| space.workspace_id == auth.workspace_id)
        .ok_or_else(|| ApiError::not_found(format!("space {id} not found")))?;
    Ok(Json(space.into()))
}

/// `PATCH /spaces/{id}`
#[instrument(skip_all, fields(space_id = %id))]
pub async fn update(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateSpaceBody>,
) -> Result<Json<SpaceView>, ApiError> {
    // Scope check before the write
    state
        .spaces
        .get_space(id)
        .await?
        .filter(|space| space.workspace_id == auth.workspace_id)
        .ok_or_else(|| ApiError::not_found(format!("space {id} not found")))?;

    let space = state
        .spaces
        .update_space(
            id,
            SpaceUpdate {
                name: body.name,
                description: body.description,
                is_active: body.is_active,
            },
        )
        .await?;
    Ok(Json(space.into()))
}

/// `DELETE /spaces/{id}`, which also scrubs `spaceIds` on the user's statements
#[instrument(skip_all, fields(space_id = %id))]
pub async fn delete(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .spaces
        .get_space(id)
        .await?
        .filter(|space| space.workspace_id == auth.workspace_id)
        .ok_or_else(|| ApiError::not_found(format!("space {id} not found")))?;

    state.spaces.delete_space(&auth.user_id, id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementIdsBody {
    pub statement_ids: Vec<Uuid>,
}

/// `POST /spaces/{id}/statements`: manual assignment
pub async fn assign_statements(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(body): Json<StatementIdsBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .spaces
        .get_space(id)
        .await?
        .filter(|space| space.workspace_id == auth.workspace_id)
        .ok_or_else(|| ApiError::not_found(format!("space {id} not found")))?;

    state
        .spaces
        .assign_statements_to_space(&body.statement_ids, id)
        .await?;
    Ok(Json(serde_json::json!({ "assigned": body.statement_ids.len() })))
}

/// `DELETE /spaces/{id}/statements`
pub async fn remove_statements(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(body): Json<StatementIdsBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .spaces
        .remove_statements_from_space(&body.statement_ids, id)
        .await?;
    let _ = auth;
    Ok(Json(serde_json::json!({ "removed": body.statement_ids.len() })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementView {
    pub id: Uuid,
    pub fact: String,
    pub valid_at: chrono::DateTime<chrono::Utc>,
    pub invalid_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// `GET /spaces/{id}/statements`
pub async fn list_statements(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<StatementView>>, ApiError> {
    let statements = state.spaces.get_space_statements(&auth.user_id, id).await?;
    Ok(Json(
        statements
            .into_iter()
            .map(|s| StatementView {
                id: s.uuid,
                fact: s.fact,
                valid_at: s.valid_at,
                invalid_at: s.invalid_at,
            })
            .collect(),
    ))
}
