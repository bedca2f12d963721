use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::enums::EpisodeType;
use crate::error::{Error, Result};

/// Ingest request payload, as accepted by `POST /ingest` and carried through
/// the queue verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub episode_body: String,
    pub reference_time: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Document title; required semantics only for DOCUMENT ingests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub episode_type: Option<EpisodeType>,
}

impl IngestRequest {
    /// Effective episode type; conversations are the default
    #[must_use]
    pub fn effective_type(&self) -> EpisodeType {
        self.episode_type.unwrap_or(EpisodeType::Conversation)
    }

    /// Validate the request at the API boundary
    pub fn validate(&self) -> Result<()> {
        if self.episode_body.trim().is_empty() {
            return Err(Error::Validation("episodeBody must not be empty".into()));
        }
        if self.source.trim().is_empty() {
            return Err(Error::Validation("source must not be empty".into()));
        }
        if self.effective_type() == EpisodeType::Document && self.session_id.is_none() {
            return Err(Error::Validation(
                "sessionId is required for DOCUMENT ingests".into(),
            ));
        }
        Ok(())
    }
}

/// One job handed to a per-user worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestJob {
    /// Matching `IngestionQueueEntry` id
    pub queue_id: Uuid,
    pub user_id: String,
    pub workspace_id: String,
    pub space_id: Option<Uuid>,
    pub request: IngestRequest,
}
