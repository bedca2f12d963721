use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::attributes::StatementAttributes;
use super::enums::{AspectType, EpisodeType, JobStatus};

// ============================================================================
// Graph nodes
// ============================================================================

/// Source document of knowledge: one ingested message, chunk, or payload.
///
/// Immutable once persisted, except for lazy linkage edges. `content` is the
/// normalized text the pipeline extracted from; `original_content` is the
/// byte-exact input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub uuid: Uuid,
    /// Normalized content; non-empty for every persisted episode
    pub content: String,
    pub original_content: String,
    /// Embedding of `content`, fixed dimension D
    pub content_embedding: Option<Vec<f32>>,
    /// Origin label ("chat", "email", an integration name)
    pub source: String,
    pub metadata: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
    /// When the content held in the world (reference time of the ingest)
    pub valid_at: DateTime<Utc>,
    pub labels: Vec<String>,
    pub user_id: String,
    pub space_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub episode_type: EpisodeType,
}

impl Episode {
    /// Create an in-memory episode for the pipeline; persisted only if
    /// normalization finds something to remember.
    #[must_use]
    pub fn new(
        content: String,
        original_content: String,
        source: String,
        valid_at: DateTime<Utc>,
        user_id: String,
        episode_type: EpisodeType,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            content,
            original_content,
            content_embedding: None,
            source,
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
            valid_at,
            labels: Vec::new(),
            user_id,
            space_id: None,
            session_id: None,
            episode_type,
        }
    }
}

/// Subject/object/predicate participant of statements.
///
/// Entities typed `"Predicate"` are deduplicated by exact case-insensitive
/// name within a user; all others by semantic similarity plus LLM judgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub uuid: Uuid,
    pub name: String,
    pub entity_type: Option<String>,
    pub attributes: BTreeMap<String, Value>,
    /// Embedding of `name`, fixed dimension D
    pub name_embedding: Option<Vec<f32>>,
    pub type_embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub user_id: String,
    pub space_id: Option<Uuid>,
}

impl Entity {
    /// Create an untyped entity
    #[must_use]
    pub fn new(name: String, user_id: String) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name,
            entity_type: None,
            attributes: BTreeMap::new(),
            name_embedding: None,
            type_embedding: None,
            created_at: Utc::now(),
            user_id,
            space_id: None,
        }
    }

    /// Create a predicate entity
    #[must_use]
    pub fn predicate(name: String, user_id: String) -> Self {
        let mut entity = Self::new(name, user_id);
        entity.entity_type = Some(crate::constants::PREDICATE_TYPE.to_string());
        entity
    }

    /// Whether this entity names a predicate
    #[must_use]
    pub fn is_predicate(&self) -> bool {
        self.entity_type.as_deref() == Some(crate::constants::PREDICATE_TYPE)
    }
}

/// Reified fact node linking subject, predicate, and object entities.
///
/// Valid while `invalid_at` is `None`. Bitemporal: `valid_at`/`invalid_at`
/// track truth in the world, `created_at` tracks the write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub uuid: Uuid,
    /// Natural-language rendering of the fact
    pub fact: String,
    pub fact_embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub valid_at: DateTime<Utc>,
    pub invalid_at: Option<DateTime<Utc>>,
    /// Episode or document whose ingestion invalidated this statement
    pub invalidated_by: Option<Uuid>,
    pub attributes: StatementAttributes,
    pub user_id: String,
    pub space_id: Option<Uuid>,
    /// Spaces this statement is assigned to
    pub space_ids: Vec<Uuid>,
    /// When a space assignment last touched this statement
    pub last_space_assignment: Option<DateTime<Utc>>,
    pub space_assignment_method: Option<super::enums::AssignmentMethod>,
    pub cluster_id: Option<Uuid>,
}

impl Statement {
    /// Create a valid statement effective at `valid_at`
    #[must_use]
    pub fn new(fact: String, valid_at: DateTime<Utc>, user_id: String) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            fact,
            fact_embedding: None,
            created_at: Utc::now(),
            valid_at,
            invalid_at: None,
            invalidated_by: None,
            attributes: StatementAttributes::new(),
            user_id,
            space_id: None,
            space_ids: Vec::new(),
            last_space_assignment: None,
            space_assignment_method: None,
            cluster_id: None,
        }
    }

    /// Whether the fact currently holds
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.invalid_at.is_none()
    }

    /// Mark the fact as no longer holding, recording the cause.
    ///
    /// Clamps so that `valid_at <= invalid_at` always holds.
    pub fn invalidate(&mut self, at: DateTime<Utc>, by: Uuid) {
        self.invalid_at = Some(at.max(self.valid_at));
        self.invalidated_by = Some(by);
    }
}

/// Container for a versioned chunk chain.
///
/// The highest `version` per `(session_id, user_id)` is current;
/// `previous_version_uuid` chains backwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub uuid: Uuid,
    pub title: String,
    pub original_content: String,
    pub source: String,
    pub user_id: String,
    /// Stable across versions of the same logical document
    pub session_id: String,
    /// Monotonic per `(session_id, user_id)`, starting at 1
    pub version: u32,
    /// 16 hex chars of SHA-256 over the full content
    pub content_hash: String,
    /// Ordered per-chunk hashes
    pub chunk_hashes: Vec<String>,
    pub previous_version_uuid: Option<Uuid>,
    pub total_chunks: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Community of statements produced by a clustering run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub uuid: Uuid,
    pub name: String,
    pub description: String,
    pub aspect_type: AspectType,
    pub size: usize,
    /// Centroid of member fact embeddings
    pub cluster_embedding: Option<Vec<f32>>,
    /// Members that contributed to the centroid
    pub embedding_count: usize,
    pub cohesion_score: Option<f32>,
    pub top_subjects: Vec<String>,
    pub top_predicates: Vec<String>,
    pub top_objects: Vec<String>,
    pub needs_naming: bool,
    /// Set when the cluster was split into successors
    pub evolved: bool,
    pub evolved_at: Option<DateTime<Utc>>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cluster {
    /// Create an unnamed cluster awaiting TF-IDF naming
    #[must_use]
    pub fn unnamed(uuid: Uuid, user_id: String, aspect_type: AspectType) -> Self {
        let now = Utc::now();
        Self {
            uuid,
            name: format!("Cluster {}", &uuid.to_string()[..8]),
            description: String::new(),
            aspect_type,
            size: 0,
            cluster_embedding: None,
            embedding_count: 0,
            cohesion_score: None,
            top_subjects: Vec::new(),
            top_predicates: Vec::new(),
            top_objects: Vec::new(),
            needs_naming: true,
            evolved: false,
            evolved_at: None,
            user_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fallback display name derived from the uuid
    #[must_use]
    pub fn fallback_name(&self) -> String {
        format!("Cluster {}", &self.uuid.to_string()[..8])
    }
}

/// User-defined topic that statements can be assigned to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Space {
    pub uuid: Uuid,
    /// Unique per workspace
    pub name: String,
    pub description: String,
    pub user_id: String,
    pub workspace_id: String,
    pub is_active: bool,
    /// Statement count recorded when the pattern trigger last fired
    pub statement_count_at_last_trigger: Option<u64>,
    pub last_pattern_trigger: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Space {
    /// Create an active space
    #[must_use]
    pub fn new(name: String, description: String, user_id: String, workspace_id: String) -> Self {
        let now = Utc::now();
        Self {
            uuid: Uuid::new_v4(),
            name,
            description,
            user_id,
            workspace_id,
            is_active: true,
            statement_count_at_last_trigger: None,
            last_pattern_trigger: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// Relational records
// ============================================================================

/// Externally visible job record, created before enqueue and finalized when
/// the worker returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionQueueEntry {
    pub id: Uuid,
    pub workspace_id: String,
    pub space_id: Option<Uuid>,
    pub priority: i32,
    /// Original ingest request, verbatim
    pub data: Value,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IngestionQueueEntry {
    /// Create a PENDING entry wrapping the original request
    #[must_use]
    pub fn pending(workspace_id: String, space_id: Option<Uuid>, data: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            space_id,
            priority: 0,
            data,
            output: None,
            error: None,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}
