//! # Document Differ
//!
//! Decides how a new version of a document is processed: skipped, diffed at
//! chunk level, or fully re-ingested. Small documents always re-ingest in
//! full; larger bands tolerate proportionally more churn before giving up on
//! the chunk-level path.

use serde::{Deserialize, Serialize};

use crate::chunker::ChunkedDocument;
use crate::constants::{
    LARGE_DOCUMENT_TOKENS, LARGE_DOC_FULL_REINGEST_PERCENT, MEDIUM_DOC_FULL_REINGEST_PERCENT,
    SMALL_DOCUMENT_TOKENS,
};
use crate::types::Document;

/// Processing strategy for an incoming document version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStrategy {
    /// First version for this `(session_id, user_id)`
    NewDocument,
    /// Content hash unchanged; nothing to do
    SkipProcessing,
    /// Re-ingest only the chunks whose hashes changed
    ChunkLevelDiff,
    /// Re-ingest every chunk
    FullReingest,
}

impl std::fmt::Display for DiffStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DiffStrategy::NewDocument => "new_document",
            DiffStrategy::SkipProcessing => "skip_processing",
            DiffStrategy::ChunkLevelDiff => "chunk_level_diff",
            DiffStrategy::FullReingest => "full_reingest",
        };
        write!(f, "{s}")
    }
}

/// Differ verdict: the strategy plus the evidence behind it
#[derive(Debug, Clone, PartialEq)]
pub struct DiffDecision {
    pub strategy: DiffStrategy,
    /// `changed_indices.len() / max(old, new) * 100`
    pub change_percent: f64,
    /// Chunk positions whose hash differs, including positions present on
    /// only one side
    pub changed_indices: Vec<usize>,
}

impl DiffDecision {
    fn with_strategy(strategy: DiffStrategy) -> Self {
        Self {
            strategy,
            change_percent: 0.0,
            changed_indices: Vec::new(),
        }
    }
}

/// Positions where the two hash sequences disagree
#[must_use]
pub fn changed_chunk_indices(old_hashes: &[String], new_hashes: &[String]) -> Vec<usize> {
    let len = old_hashes.len().max(new_hashes.len());
    (0..len)
        .filter(|&i| old_hashes.get(i) != new_hashes.get(i))
        .collect()
}

/// Decide the processing strategy for a new document version
#[must_use]
pub fn decide(previous: Option<&Document>, incoming: &ChunkedDocument) -> DiffDecision {
    let Some(previous) = previous else {
        return DiffDecision::with_strategy(DiffStrategy::NewDocument);
    };

    if previous.content_hash == incoming.content_hash {
        return DiffDecision::with_strategy(DiffStrategy::SkipProcessing);
    }

    let changed_indices = changed_chunk_indices(&previous.chunk_hashes, &incoming.chunk_hashes);
    let denominator = previous.chunk_hashes.len().max(incoming.chunk_hashes.len());
    let change_percent = if denominator == 0 {
        100.0
    } else {
        changed_indices.len() as f64 / denominator as f64 * 100.0
    };

    let tokens = incoming.total_tokens;
    let strategy = if tokens < SMALL_DOCUMENT_TOKENS {
        DiffStrategy::FullReingest
    } else if tokens < LARGE_DOCUMENT_TOKENS {
        if change_percent < MEDIUM_DOC_FULL_REINGEST_PERCENT {
            DiffStrategy::ChunkLevelDiff
        } else {
            DiffStrategy::FullReingest
        }
    } else if change_percent < LARGE_DOC_FULL_REINGEST_PERCENT {
        DiffStrategy::ChunkLevelDiff
    } else {
        DiffStrategy::FullReingest
    };

    DiffDecision {
        strategy,
        change_percent,
        changed_indices,
    }
}
