//! Authenticated request context.
//!
//! Session handling lives outside this crate; the authenticated identity
//! reaches these handlers as `x-user-id` / `x-workspace-id` headers set by
//! the fronting auth layer.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;

/// Identity of the caller, required on every route
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub workspace_id: String,
}

impl<S: Send + Sync> FromRequestParts<S> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ApiError::unauthorized("authentication required"))?
            .to_string();

        let workspace_id = parts
            .headers
            .get("x-workspace-id")
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ApiError::bad_request("Workspace ID is required for ingestion"))?
            .to_string();

        Ok(Self {
            user_id,
            workspace_id,
        })
    }
}
