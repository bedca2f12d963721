//! Storage abstraction: the typed operation surface of the property-graph
//! store plus the relational job and space stores.
//!
//! This is the seam between domain logic and backends. All writes are
//! idempotent upserts keyed by `uuid`; sessions/connections never outlive a
//! single call.

mod jobs;
mod spaces;

pub use jobs::{JobPage, JobStore};
pub use spaces::{SpaceStore, SpaceUpdate};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{Cluster, Document, Entity, Episode, Statement};

/// Entity with its similarity score against a query embedding
#[derive(Debug, Clone)]
pub struct ScoredEntity {
    pub entity: Entity,
    pub score: f32,
}

/// Statement with its similarity score against a query embedding
#[derive(Debug, Clone)]
pub struct ScoredStatement {
    pub statement: Statement,
    pub score: f32,
}

/// Episode with its similarity score against a query embedding
#[derive(Debug, Clone)]
pub struct ScoredEpisode {
    pub episode: Episode,
    pub score: f32,
}

/// Vector search over entity name embeddings
#[derive(Debug, Clone)]
pub struct SimilarEntityQuery {
    pub embedding: Vec<f32>,
    pub limit: usize,
    pub threshold: f32,
    pub user_id: String,
    /// Restrict candidates to this entity type when set
    pub entity_type: Option<String>,
}

/// Vector search over statement fact embeddings
#[derive(Debug, Clone)]
pub struct SimilarStatementQuery {
    pub embedding: Vec<f32>,
    pub threshold: f32,
    pub limit: usize,
    pub user_id: String,
    /// Statement uuids already collected by earlier phases
    pub exclude: Vec<Uuid>,
}

/// Statement hydrated with its three entity endpoints
#[derive(Debug, Clone)]
pub struct StatementTriple {
    pub statement: Statement,
    pub subject: Entity,
    pub predicate: Entity,
    pub object: Entity,
}

/// Window query for prior episodes of the same source/session
#[derive(Debug, Clone)]
pub struct RecentEpisodesQuery {
    pub user_id: String,
    pub source: Option<String>,
    pub session_id: Option<String>,
    /// Only episodes with `valid_at <= before`
    pub before: DateTime<Utc>,
    pub limit: usize,
}

/// Ephemeral SIMILAR_TO edge between two statements sharing entities
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityEdge {
    pub source: Uuid,
    pub target: Uuid,
    /// `shared_entities.len() * 2`
    pub weight: f64,
    pub shared_entities: Vec<Uuid>,
}

/// SPLIT_INTO edge payload recorded during cluster evolution
#[derive(Debug, Clone)]
pub struct ClusterSplit {
    pub reason: String,
    pub original_size: usize,
    pub new_size: usize,
}

/// Cascade summary returned by episode deletion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpisodeDeletion {
    /// Statements removed because the episode was their sole provenance
    pub statements_removed: usize,
    /// Entities removed because those statements were their last reference
    pub entities_removed: usize,
}

/// Typed operations over the property-graph store.
///
/// Implementations own their connection handling; every method opens, uses,
/// and releases its session internally. Errors surface unmodified; no
/// retries at this layer.
#[async_trait]
pub trait GraphStore: Send + Sync {
    // ========== Schema ==========

    /// Create constraints and indexes once per process.
    ///
    /// Idempotent; returns `false` (after logging) when initialization
    /// failed; callers may proceed if the expected indexes already exist.
    async fn init_schema(&self) -> Result<bool>;

    // ========== Node upserts ==========

    async fn save_episode(&self, episode: &Episode) -> Result<()>;

    async fn get_episode(&self, user_id: &str, uuid: Uuid) -> Result<Option<Episode>>;

    /// Delete an episode and cascade: statements whose sole provenance it
    /// was are removed, as are entities orphaned by that removal.
    async fn delete_episode(&self, user_id: &str, uuid: Uuid) -> Result<EpisodeDeletion>;

    async fn save_entity(&self, entity: &Entity) -> Result<()>;

    async fn save_statement(&self, statement: &Statement) -> Result<()>;

    /// Upsert a full triple: statement node, its three entity endpoints,
    /// the HAS_SUBJECT/HAS_PREDICATE/HAS_OBJECT edges, and the
    /// HAS_PROVENANCE edge from `episode_uuid`.
    async fn save_triple(&self, episode_uuid: Uuid, triple: &StatementTriple) -> Result<()>;

    /// Attach an episode as additional provenance on an existing statement
    /// (a later episode restating a known fact)
    async fn link_provenance(&self, episode_uuid: Uuid, statement_uuid: Uuid) -> Result<()>;

    async fn save_document(&self, document: &Document) -> Result<()>;

    async fn latest_document(&self, user_id: &str, session_id: &str) -> Result<Option<Document>>;

    /// CONTAINS_CHUNK edge from document to chunk episode
    async fn link_episode_to_document(
        &self,
        episode_uuid: Uuid,
        document_uuid: Uuid,
        chunk_index: usize,
    ) -> Result<()>;

    /// Statements reachable via
    /// `document -CONTAINS_CHUNK-> episode -HAS_PROVENANCE-> statement`
    async fn document_statements(&self, document_uuid: Uuid) -> Result<Vec<Statement>>;

    /// Same traversal restricted to the given chunk indices
    async fn document_chunk_statements(
        &self,
        document_uuid: Uuid,
        chunk_indices: &[usize],
    ) -> Result<Vec<Statement>>;

    // ========== Search ==========

    async fn find_similar_entities(&self, query: &SimilarEntityQuery)
        -> Result<Vec<ScoredEntity>>;

    /// Exact case-insensitive predicate-name matches within a user
    async fn find_exact_predicate_matches(
        &self,
        predicate_name: &str,
        user_id: &str,
    ) -> Result<Vec<Entity>>;

    /// Valid statements with the same subject and predicate
    async fn find_contradictory_statements(
        &self,
        subject_id: Uuid,
        predicate_id: Uuid,
        user_id: &str,
    ) -> Result<Vec<Statement>>;

    /// Valid statements with the same subject and object but a different
    /// predicate
    async fn find_statements_with_same_subject_object(
        &self,
        subject_id: Uuid,
        object_id: Uuid,
        exclude_predicate_id: Option<Uuid>,
        user_id: &str,
    ) -> Result<Vec<Statement>>;

    async fn find_similar_statements(
        &self,
        query: &SimilarStatementQuery,
    ) -> Result<Vec<ScoredStatement>>;

    async fn get_triple_for_statement(&self, statement_id: Uuid)
        -> Result<Option<StatementTriple>>;

    async fn search_statements_by_embedding(
        &self,
        embedding: &[f32],
        user_id: &str,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ScoredStatement>>;

    async fn search_episodes_by_embedding(
        &self,
        embedding: &[f32],
        user_id: &str,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ScoredEpisode>>;

    /// Fulltext search over `statement.fact`
    async fn search_statements_by_text(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Statement>>;

    /// Fulltext search over `entity.name`
    async fn search_entities_by_name(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Entity>>;

    async fn get_episode_statements(&self, episode_uuid: Uuid) -> Result<Vec<Statement>>;

    async fn get_recent_episodes(&self, query: &RecentEpisodesQuery) -> Result<Vec<Episode>>;

    // ========== Invalidation ==========

    /// Bulk-set `invalid_at`/`invalidated_by` on the given statements.
    /// Returns the number actually transitioned (already-invalid rows are
    /// left untouched).
    async fn invalidate_statements(
        &self,
        statement_ids: &[Uuid],
        invalidated_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<usize>;

    // ========== Clustering support ==========

    async fn valid_statements(&self, user_id: &str) -> Result<Vec<Statement>>;

    async fn unclustered_valid_statements(&self, user_id: &str) -> Result<Vec<Statement>>;

    /// `(statement_uuid, entity_uuid)` pairs over valid statements,
    /// covering subject, predicate, and object edges
    async fn valid_statement_entity_pairs(&self, user_id: &str) -> Result<Vec<(Uuid, Uuid)>>;

    /// MERGE SIMILAR_TO edges (undirected; one row per unordered pair)
    async fn merge_similarity_edges(&self, user_id: &str, edges: &[SimilarityEdge]) -> Result<()>;

    /// Read back the current projection for a Leiden run
    async fn similarity_edges(&self, user_id: &str) -> Result<Vec<SimilarityEdge>>;

    /// Drop every SIMILAR_TO edge for the user (end of a clustering run)
    async fn drop_similarity_edges(&self, user_id: &str) -> Result<()>;

    async fn assign_cluster(&self, statement_ids: &[Uuid], cluster_id: Uuid) -> Result<()>;

    async fn clear_cluster_assignments(&self, user_id: &str) -> Result<()>;

    async fn save_cluster(&self, cluster: &Cluster) -> Result<()>;

    async fn get_cluster(&self, cluster_id: Uuid) -> Result<Option<Cluster>>;

    async fn get_clusters(&self, user_id: &str) -> Result<Vec<Cluster>>;

    async fn delete_clusters(&self, user_id: &str) -> Result<()>;

    async fn cluster_members(&self, cluster_id: Uuid) -> Result<Vec<Statement>>;

    /// SPLIT_INTO edge from an evolved cluster to a successor
    async fn record_cluster_split(
        &self,
        from_cluster: Uuid,
        to_cluster: Uuid,
        split: &ClusterSplit,
    ) -> Result<()>;

    /// Outgoing SPLIT_INTO edges of a cluster
    async fn cluster_splits(&self, from_cluster: Uuid) -> Result<Vec<(Uuid, ClusterSplit)>>;

    // ========== Spaces on statements ==========

    /// Append `space_id` to each statement's `space_ids`, stamping the
    /// assignment bookkeeping fields
    async fn add_statements_to_space(
        &self,
        statement_ids: &[Uuid],
        space_id: Uuid,
        method: crate::types::AssignmentMethod,
    ) -> Result<()>;

    async fn remove_statements_from_space(
        &self,
        statement_ids: &[Uuid],
        space_id: Uuid,
    ) -> Result<()>;

    /// Remove `space_id` from every statement's `space_ids` for the user.
    /// Returns the number of statements touched.
    async fn scrub_space(&self, user_id: &str, space_id: Uuid) -> Result<usize>;

    async fn get_space_statements(&self, user_id: &str, space_id: Uuid)
        -> Result<Vec<Statement>>;

    /// Count of valid statements for the user
    async fn statement_count(&self, user_id: &str) -> Result<u64>;
}
