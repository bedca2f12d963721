//! End-to-end document versioning: new documents, skip on identical
//! content, chunk-level diffs, and cross-version invalidation.

use chrono::Utc;
use std::sync::Arc;

use recall_core::document::{DiffStrategy, DocumentIngester};
use recall_core::embeddings::EmbeddingProvider;
use recall_core::graph::{GraphStore, StatementTriple};
use recall_core::llm::LanguageModel;
use recall_core::pipeline::IngestionPipeline;
use recall_core::types::{Entity, Statement};
use recall_storage_turso::TursoGraphStore;
use test_utils::{document_request, entities_output, ScriptedModel, StubEmbeddings};

const DIM: usize = 8;

fn basis(index: usize) -> Vec<f32> {
    let mut vector = vec![0.0; DIM];
    vector[index] = 1.0;
    vector
}

struct Harness {
    graph: Arc<TursoGraphStore>,
    embeddings: Arc<StubEmbeddings>,
    model: Arc<ScriptedModel>,
    ingester: DocumentIngester,
}

async fn harness() -> Harness {
    let graph = Arc::new(TursoGraphStore::in_memory().await.unwrap());
    assert!(graph.initialize_schema().await);
    let embeddings = Arc::new(StubEmbeddings::new(DIM));
    let model = Arc::new(ScriptedModel::new());

    let pipeline = Arc::new(IngestionPipeline::new(
        graph.clone() as Arc<dyn GraphStore>,
        embeddings.clone() as Arc<dyn EmbeddingProvider>,
        model.clone() as Arc<dyn LanguageModel>,
    ));
    let ingester = DocumentIngester::new(
        graph.clone() as Arc<dyn GraphStore>,
        embeddings.clone() as Arc<dyn EmbeddingProvider>,
        pipeline,
    );
    Harness {
        graph,
        embeddings,
        model,
        ingester,
    }
}

/// Queue the per-chunk pipeline responses: normalization echoes, entity
/// extraction finds nothing (statements are planted directly where tests
/// need them)
fn queue_empty_chunk_responses(model: &ScriptedModel, chunks: usize) {
    for _ in 0..chunks {
        model.push_response("<output>chunk knowledge noted</output>");
        model.push_response(entities_output(&[]));
    }
}

fn section_body(section: usize, words: usize, marker: &str) -> String {
    (0..words)
        .map(|i| format!("{marker}{}", (section * 131 + i * 7) % 997))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Twelve medium sections, ~29k tokens total. The changed variant swaps the
/// last section's words for same-length replacements, so token geometry and
/// chunk boundaries stay identical and only the final chunk's hash moves.
fn document_text(changed_last_section: bool) -> String {
    let mut text = String::new();
    for section in 1..=12 {
        text.push_str(&format!("# Section {section}\n\n"));
        let marker = if section == 12 && changed_last_section {
            "wore"
        } else {
            "word"
        };
        text.push_str(&section_body(section, 1200, marker));
        text.push_str("\n\n");
    }
    text
}

fn small_document(marker: &str) -> String {
    format!("# Notes\n\n{}", section_body(1, 400, marker))
}

#[tokio::test]
async fn first_version_ingests_every_chunk() {
    let h = harness().await;
    let content = small_document("word");
    queue_empty_chunk_responses(&h.model, 1);

    let outcome = h
        .ingester
        .ingest("u1", &document_request(&content, "u1", "doc-1", Utc::now()))
        .await
        .unwrap();

    assert_eq!(outcome.strategy, DiffStrategy::NewDocument);
    assert_eq!(outcome.version, 1);
    assert_eq!(outcome.chunks_ingested, 1);
    assert_eq!(outcome.episode_uuids.len(), 1);

    let stored = h.graph.latest_document("u1", "doc-1").await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.total_chunks, 1);
    assert!(stored.previous_version_uuid.is_none());
}

#[tokio::test]
async fn byte_identical_content_skips_processing() {
    let h = harness().await;
    let content = small_document("word");

    queue_empty_chunk_responses(&h.model, 1);
    let first = h
        .ingester
        .ingest("u1", &document_request(&content, "u1", "doc-1", Utc::now()))
        .await
        .unwrap();

    // No responses queued: a skip must not touch the model at all
    let second = h
        .ingester
        .ingest("u1", &document_request(&content, "u1", "doc-1", Utc::now()))
        .await
        .unwrap();

    assert_eq!(second.strategy, DiffStrategy::SkipProcessing);
    assert_eq!(second.version, first.version);
    assert_eq!(second.document_uuid, first.document_uuid);
    assert_eq!(second.chunks_ingested, 0);
    assert_eq!(second.statements_created, 0);

    let stored = h.graph.latest_document("u1", "doc-1").await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn small_document_changes_full_reingest_with_version_bump() {
    let h = harness().await;

    queue_empty_chunk_responses(&h.model, 1);
    let first = h
        .ingester
        .ingest(
            "u1",
            &document_request(&small_document("word"), "u1", "doc-1", Utc::now()),
        )
        .await
        .unwrap();

    queue_empty_chunk_responses(&h.model, 1);
    let second = h
        .ingester
        .ingest(
            "u1",
            &document_request(&small_document("revised"), "u1", "doc-1", Utc::now()),
        )
        .await
        .unwrap();

    assert_eq!(second.strategy, DiffStrategy::FullReingest);
    assert_eq!(second.version, 2);

    let stored = h.graph.latest_document("u1", "doc-1").await.unwrap().unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.previous_version_uuid, Some(first.document_uuid));
    assert_ne!(stored.content_hash, "");
}

#[tokio::test]
async fn chunk_level_diff_reingests_only_changed_chunks() {
    let h = harness().await;
    let v1_text = document_text(false);
    let v2_text = document_text(true);

    // Work out the chunk geometry up front: only the final section changed,
    // so exactly one chunk hash differs and the change ratio sits in the
    // chunk-diff band
    let chunker = recall_core::SemanticChunker::new();
    let v1_chunks = chunker.chunk(&v1_text, "doc-1");
    let v2_chunks = chunker.chunk(&v2_text, "doc-1");
    assert_eq!(v1_chunks.total_chunks, v2_chunks.total_chunks);
    assert!(v1_chunks.total_tokens >= 5_000 && v1_chunks.total_tokens < 50_000);
    let changed = recall_core::document::changed_chunk_indices(
        &v1_chunks.chunk_hashes,
        &v2_chunks.chunk_hashes,
    );
    assert_eq!(changed.len(), 1);
    let changed_index = changed[0];
    assert!((changed.len() as f64 / v1_chunks.total_chunks as f64) * 100.0 < 20.0);

    // Pin the cross-version similarity inputs: the v2 text embeds to e0,
    // the surviving fact aligns with it, the departed fact is orthogonal
    h.embeddings.register(v2_text.clone(), basis(0));
    h.embeddings
        .register("kept fact aligned with the document", basis(0));
    h.embeddings
        .register("departed fact the new version dropped", basis(1));

    queue_empty_chunk_responses(&h.model, v1_chunks.total_chunks);
    let first = h
        .ingester
        .ingest("u1", &document_request(&v1_text, "u1", "doc-1", Utc::now()))
        .await
        .unwrap();
    assert_eq!(first.strategy, DiffStrategy::NewDocument);
    assert_eq!(first.total_chunks, v1_chunks.total_chunks);
    assert_eq!(first.episode_uuids.len(), v1_chunks.total_chunks);

    // Plant statements behind specific chunks of v1
    let plant = |fact: &str, embedding: Vec<f32>| {
        let mut statement = Statement::new(fact.to_string(), Utc::now(), "u1".to_string());
        statement.fact_embedding = Some(embedding);
        StatementTriple {
            statement,
            subject: Entity::new(format!("subject-{fact}"), "u1".into()),
            predicate: Entity::predicate("mentions".into(), "u1".into()),
            object: Entity::new(format!("object-{fact}"), "u1".into()),
        }
    };
    // Plant one statement on an untouched chunk; the changed chunk carries
    // one fact that survives and one that departs
    let untouched_index = usize::from(changed_index == 0);
    let stable = plant("stable fact on an unchanged chunk", basis(1));
    h.graph
        .save_triple(first.episode_uuids[untouched_index], &stable)
        .await
        .unwrap();
    let kept = plant("kept fact aligned with the document", basis(0));
    let departed = plant("departed fact the new version dropped", basis(1));
    h.graph
        .save_triple(first.episode_uuids[changed_index], &kept)
        .await
        .unwrap();
    h.graph
        .save_triple(first.episode_uuids[changed_index], &departed)
        .await
        .unwrap();

    // v2 changes only the last section → one chunk in the diff band
    queue_empty_chunk_responses(&h.model, 1);
    let second = h
        .ingester
        .ingest("u1", &document_request(&v2_text, "u1", "doc-1", Utc::now()))
        .await
        .unwrap();

    assert_eq!(second.strategy, DiffStrategy::ChunkLevelDiff);
    assert_eq!(second.version, 2);
    assert_eq!(second.chunks_ingested, 1);
    assert!(second.change_percent < 20.0);
    assert_eq!(second.cross_version_invalidated, 1);

    // Statement on the unchanged chunk was never evaluated
    let stable_loaded = h
        .graph
        .get_triple_for_statement(stable.statement.uuid)
        .await
        .unwrap()
        .unwrap()
        .statement;
    assert!(stable_loaded.is_valid());

    // On the changed chunk: aligned fact kept, departed fact invalidated by
    // the new document version
    let kept_loaded = h
        .graph
        .get_triple_for_statement(kept.statement.uuid)
        .await
        .unwrap()
        .unwrap()
        .statement;
    assert!(kept_loaded.is_valid());

    let departed_loaded = h
        .graph
        .get_triple_for_statement(departed.statement.uuid)
        .await
        .unwrap()
        .unwrap()
        .statement;
    assert!(!departed_loaded.is_valid());
    assert_eq!(departed_loaded.invalidated_by, Some(second.document_uuid));
}

#[tokio::test]
async fn document_ingest_requires_session_id() {
    let h = harness().await;
    let mut request = document_request("content", "u1", "doc-1", Utc::now());
    request.session_id = None;
    let result = h.ingester.ingest("u1", &request).await;
    assert!(result.is_err());
}
