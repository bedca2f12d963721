//! System-wide constants.
//!
//! Thresholds are cosine similarities in `[0, 1]` unless noted otherwise.

/// Sentinel returned by normalization when an episode carries nothing worth keeping
pub const NOTHING_TO_REMEMBER: &str = "NOTHING_TO_REMEMBER";

/// Previous episodes pulled into the ingestion context window
pub const DEFAULT_EPISODE_WINDOW: usize = 5;

/// Minimum cosine similarity for related-memory retrieval
pub const RELATED_MEMORY_THRESHOLD: f32 = 0.75;

/// Maximum related episodes handed to the normalization prompt
pub const RELATED_EPISODE_LIMIT: usize = 5;

/// Maximum related statements handed to the normalization prompt
pub const RELATED_STATEMENT_LIMIT: usize = 10;

/// Minimum cosine similarity for entity dedup candidates
pub const ENTITY_SIMILARITY_THRESHOLD: f32 = 0.7;

/// Maximum entity dedup candidates per extracted entity
pub const ENTITY_CANDIDATE_LIMIT: usize = 5;

/// Minimum cosine similarity for semantic statement candidates
pub const STATEMENT_SIMILARITY_THRESHOLD: f32 = 0.85;

/// Entity type name reserved for predicates
pub const PREDICATE_TYPE: &str = "Predicate";

/// Chunker target size in tokens
pub const TARGET_CHUNK_SIZE: usize = 3000;

/// Chunker minimum emit size in tokens
pub const MIN_CHUNK_SIZE: usize = 1000;

/// Chunker hard ceiling in tokens
pub const MAX_CHUNK_SIZE: usize = 5000;

/// Smallest residue worth emitting, in tokens
pub const MIN_PARAGRAPH_SIZE: usize = 100;

/// Documents below this size always re-ingest in full (tokens)
pub const SMALL_DOCUMENT_TOKENS: usize = 5_000;

/// Documents at or above this size use the relaxed change threshold (tokens)
pub const LARGE_DOCUMENT_TOKENS: usize = 50_000;

/// Change percentage at which a medium document re-ingests in full
pub const MEDIUM_DOC_FULL_REINGEST_PERCENT: f64 = 20.0;

/// Change percentage at which a large document re-ingests in full
pub const LARGE_DOC_FULL_REINGEST_PERCENT: f64 = 30.0;

/// Cross-version statements below this similarity to the new text are invalidated
pub const CROSS_VERSION_KEEP_THRESHOLD: f32 = 0.75;

/// Smallest community that survives cluster finalisation
pub const MIN_CLUSTER_SIZE: usize = 10;

/// Leiden resolution parameter (CPM gamma)
pub const LEIDEN_GAMMA: f64 = 0.7;

/// Maximum Leiden aggregation levels
pub const LEIDEN_MAX_LEVELS: usize = 5;

/// Leiden convergence tolerance on quality gain
pub const LEIDEN_TOLERANCE: f64 = 0.001;

/// Clusters with mean member-to-centroid similarity below this have drifted
pub const COHESION_THRESHOLD: f32 = 0.6;

/// Statement growth that arms the space pattern trigger
pub const SPACE_TRIGGER_GROWTH: u64 = 100;

/// Upper bound on concurrently open graph sessions
pub const GRAPH_SESSION_LIMIT: usize = 50;
