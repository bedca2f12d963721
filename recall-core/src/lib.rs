#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_docs_in_private_items)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Recall Core
//!
//! A reified temporal knowledge graph memory: heterogeneous text episodes go
//! in, first-class `Statement` nodes with provenance and bitemporal validity
//! come out, and derived structure (entity dedup, contradiction resolution,
//! community clusters, document versions, topic spaces) is maintained
//! continuously.
//!
//! ## Core Concepts
//!
//! - **Episodes**: ingested source texts (messages, document chunks,
//!   integration payloads)
//! - **Statements**: reified subject–predicate–object facts with
//!   `valid_at`/`invalid_at` and `HAS_PROVENANCE` back to their episode
//! - **Entities**: the subjects, predicates, and objects statements link
//! - **Clusters**: Leiden communities over statements sharing entities
//! - **Spaces**: user-defined topics statements get assigned to
//!
//! ## Module Organization
//!
//! ### Primary APIs
//! - [`pipeline`]: the episode → graph ingestion pipeline
//! - [`queue`]: per-user FIFO job queue with lifecycle-tracked entries
//! - [`document`]: versioned document diffing and differential re-ingestion
//! - [`clustering`]: community clustering with drift-based evolution
//! - [`spaces`]: topic space CRUD and LLM assignment
//!
//! ### Seams and support
//! - [`graph`]: the typed property-graph store surface (implemented by
//!   `recall-storage-turso`)
//! - [`embeddings`], [`llm`]: adapter traits for the embedding and language
//!   model providers
//! - [`chunker`]: deterministic semantic chunking
//! - [`resolution`]: entity and statement resolvers
//! - [`metrics`]: per-job token and latency accounting
//! - [`types`], [`error`], [`constants`]: shared vocabulary
//!
//! ## Ingestion flow
//!
//! 1. `POST /ingest` validates and enqueues; the entry is PENDING
//! 2. The user's worker picks the job up: PROCESSING
//! 3. The pipeline normalizes, extracts entities and statements, resolves
//!    them against the stored graph, and persists episode + triples
//! 4. Contradicted statements are invalidated with the episode as cause
//! 5. Clustering and space analysis run out of band
//!
//! ## Error Handling
//!
//! Most functions return [`Result<T>`]:
//!
//! ```no_run
//! use recall_core::{Error, Result};
//!
//! async fn example() -> Result<()> {
//!     // Operations that can fail
//!     // .await?
//!     Ok(())
//! }
//! ```

pub mod chunker;
pub mod clustering;
pub mod constants;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod graph;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod resolution;
pub mod spaces;
pub mod types;

// Re-export commonly used types
pub use chunker::{ChunkedDocument, ChunkerConfig, DocumentChunk, SemanticChunker};
pub use clustering::{ClusteringEngine, ClusteringMode, ClusteringOutcome};
pub use document::{DiffDecision, DiffStrategy, DocumentIngester, DocumentOutcome};
pub use embeddings::EmbeddingProvider;
pub use error::{Error, Result};
pub use graph::{GraphStore, JobStore, SpaceStore, StatementTriple};
pub use llm::{Complexity, Generation, LanguageModel, Message};
pub use metrics::{PipelineMetrics, TokenUsage};
pub use pipeline::{IngestOutcome, IngestProcessor, IngestionPipeline};
pub use queue::{IngestQueue, JobProcessor, QueueStats};
pub use spaces::{CreateSpaceParams, SpaceService};
pub use types::{
    AspectType, AssignmentMethod, Cluster, ClusteringConfig, Document, Entity, Episode,
    EpisodeType, IngestJob, IngestRequest, IngestionQueueEntry, JobStatus, QueueConfig,
    RecallConfig, Space, Statement, StatementAttributes,
};
