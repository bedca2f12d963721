//! # Document Ingester
//!
//! Differential ingestion of versioned documents: chunk, diff against the
//! stored version, run only what changed through the episode pipeline, and
//! invalidate statements the new version no longer supports.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::differ::{self, DiffStrategy};
use crate::chunker::{ChunkedDocument, DocumentChunk, SemanticChunker};
use crate::constants::CROSS_VERSION_KEEP_THRESHOLD;
use crate::embeddings::{cosine_similarity, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::graph::GraphStore;
use crate::pipeline::{IngestOutcome, IngestionPipeline};
use crate::types::{Document, EpisodeType, IngestRequest, Statement};

/// Result of one document ingestion, serialized into the queue entry output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentOutcome {
    pub document_uuid: Uuid,
    pub version: u32,
    pub strategy: DiffStrategy,
    pub change_percent: f64,
    pub chunks_ingested: usize,
    pub total_chunks: usize,
    pub statements_created: usize,
    /// Invalidations issued by the per-chunk pipeline runs
    pub statements_invalidated: usize,
    /// Invalidations issued by the cross-version similarity rule
    pub cross_version_invalidated: usize,
    pub episode_uuids: Vec<Uuid>,
}

/// Chunk-diffing document ingester over the episode pipeline
pub struct DocumentIngester {
    graph: Arc<dyn GraphStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    pipeline: Arc<IngestionPipeline>,
    chunker: SemanticChunker,
}

impl DocumentIngester {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
        pipeline: Arc<IngestionPipeline>,
    ) -> Self {
        Self {
            graph,
            embeddings,
            pipeline,
            chunker: SemanticChunker::new(),
        }
    }

    /// Ingest one document version
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn ingest(&self, user_id: &str, request: &IngestRequest) -> Result<DocumentOutcome> {
        let session_id = request
            .session_id
            .as_deref()
            .ok_or_else(|| Error::Validation("DOCUMENT ingest requires sessionId".into()))?;
        let title = request
            .name
            .clone()
            .unwrap_or_else(|| session_id.to_string());

        let chunked = self.chunker.chunk(&request.episode_body, &title);
        let previous = self.graph.latest_document(user_id, session_id).await?;
        let decision = differ::decide(previous.as_ref(), &chunked);

        info!(
            strategy = %decision.strategy,
            change_percent = decision.change_percent,
            chunks = chunked.total_chunks,
            "Document diff decided"
        );

        if decision.strategy == DiffStrategy::SkipProcessing {
            // Unwrap is safe: skip only happens against a stored version
            let previous = previous.ok_or_else(|| {
                Error::InvalidState("skip_processing decided without a stored document".into())
            })?;
            return Ok(DocumentOutcome {
                document_uuid: previous.uuid,
                version: previous.version,
                strategy: DiffStrategy::SkipProcessing,
                change_percent: 0.0,
                chunks_ingested: 0,
                total_chunks: previous.total_chunks,
                statements_created: 0,
                statements_invalidated: 0,
                cross_version_invalidated: 0,
                episode_uuids: Vec::new(),
            });
        }

        // Version chain: content changed, so the version advances
        let document = self.build_document(user_id, session_id, &title, request, &chunked, previous.as_ref());
        self.graph.save_document(&document).await?;

        // Which chunks flow through the pipeline
        let chunks_to_ingest: Vec<&DocumentChunk> = match decision.strategy {
            DiffStrategy::ChunkLevelDiff => decision
                .changed_indices
                .iter()
                .filter_map(|&index| chunked.chunks.get(index))
                .collect(),
            _ => chunked.chunks.iter().collect(),
        };

        let mut statements_created = 0;
        let mut statements_invalidated = 0;
        let mut episode_uuids = Vec::new();
        for chunk in &chunks_to_ingest {
            let outcome = self
                .ingest_chunk(user_id, request, &document, chunk)
                .await?;
            statements_created += outcome.statements_created;
            statements_invalidated += outcome.statements_invalidated;
            if let Some(episode_uuid) = outcome.episode_uuid {
                self.graph
                    .link_episode_to_document(episode_uuid, document.uuid, chunk.index)
                    .await?;
                episode_uuids.push(episode_uuid);
            }
        }

        // Cross-version invalidation against the statements of the prior
        // version: all of them on a full re-ingest, only those behind the
        // changed chunks on a chunk-level diff
        let cross_version_invalidated = match (&previous, decision.strategy) {
            (Some(previous), DiffStrategy::FullReingest) => {
                let statements = self.graph.document_statements(previous.uuid).await?;
                self.invalidate_departed(&document, &request.episode_body, statements)
                    .await?
            }
            (Some(previous), DiffStrategy::ChunkLevelDiff) => {
                let statements = self
                    .graph
                    .document_chunk_statements(previous.uuid, &decision.changed_indices)
                    .await?;
                self.invalidate_departed(&document, &request.episode_body, statements)
                    .await?
            }
            _ => 0,
        };

        info!(
            document = %document.uuid,
            version = document.version,
            chunks_ingested = chunks_to_ingest.len(),
            statements_created,
            cross_version_invalidated,
            "Document ingested"
        );

        Ok(DocumentOutcome {
            document_uuid: document.uuid,
            version: document.version,
            strategy: decision.strategy,
            change_percent: decision.change_percent,
            chunks_ingested: chunks_to_ingest.len(),
            total_chunks: chunked.total_chunks,
            statements_created,
            statements_invalidated,
            cross_version_invalidated,
            episode_uuids,
        })
    }

    fn build_document(
        &self,
        user_id: &str,
        session_id: &str,
        title: &str,
        request: &IngestRequest,
        chunked: &ChunkedDocument,
        previous: Option<&Document>,
    ) -> Document {
        let now = Utc::now();
        Document {
            uuid: Uuid::new_v4(),
            title: title.to_string(),
            original_content: request.episode_body.clone(),
            source: request.source.clone(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            version: previous.map_or(1, |p| p.version + 1),
            content_hash: chunked.content_hash.clone(),
            chunk_hashes: chunked.chunk_hashes.clone(),
            previous_version_uuid: previous.map(|p| p.uuid),
            total_chunks: chunked.total_chunks,
            created_at: now,
            updated_at: now,
        }
    }

    /// Run one chunk through the episode pipeline
    async fn ingest_chunk(
        &self,
        user_id: &str,
        request: &IngestRequest,
        document: &Document,
        chunk: &DocumentChunk,
    ) -> Result<IngestOutcome> {
        let mut metadata = request.metadata.clone();
        metadata.insert(
            "documentUuid".to_string(),
            Value::String(document.uuid.to_string()),
        );
        metadata.insert("chunkIndex".to_string(), Value::from(chunk.index));
        if !chunk.context.is_empty() {
            metadata.insert(
                "chunkContext".to_string(),
                Value::String(chunk.context.clone()),
            );
        }

        let chunk_request = IngestRequest {
            episode_body: chunk.content.clone(),
            reference_time: request.reference_time,
            metadata,
            source: request.source.clone(),
            space_id: request.space_id,
            session_id: Some(document.session_id.clone()),
            name: Some(document.title.clone()),
            episode_type: Some(EpisodeType::Document),
        };
        self.pipeline.run(user_id, &chunk_request).await
    }

    /// Invalidate statements the new document text no longer supports.
    ///
    /// Embedding failure invalidates conservatively: a fact we cannot
    /// re-check against the new text does not get the benefit of the doubt.
    async fn invalidate_departed(
        &self,
        new_document: &Document,
        new_text: &str,
        statements: Vec<Statement>,
    ) -> Result<usize> {
        let candidates: Vec<Statement> =
            statements.into_iter().filter(Statement::is_valid).collect();
        if candidates.is_empty() {
            return Ok(0);
        }

        let departed: Vec<Uuid> = match self.embeddings.embed_text(new_text).await {
            Ok(document_embedding) => candidates
                .iter()
                .filter(|statement| {
                    statement.fact_embedding.as_ref().is_none_or(|embedding| {
                        cosine_similarity(embedding, &document_embedding)
                            < CROSS_VERSION_KEEP_THRESHOLD
                    })
                })
                .map(|statement| statement.uuid)
                .collect(),
            Err(e) => {
                warn!(error = %e, "Document embedding failed; invalidating all prior statements");
                candidates.iter().map(|statement| statement.uuid).collect()
            }
        };

        if departed.is_empty() {
            return Ok(0);
        }
        self.graph
            .invalidate_statements(&departed, new_document.uuid, Utc::now())
            .await
    }
}
