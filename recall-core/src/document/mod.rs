//! Document versioning: chunk-level diffing and differential re-ingestion.

pub mod differ;
mod ingester;

pub use differ::{changed_chunk_indices, decide, DiffDecision, DiffStrategy};
pub use ingester::{DocumentIngester, DocumentOutcome};
