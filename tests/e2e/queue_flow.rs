//! Full queue → processor → pipeline loop over the relational job store.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use recall_core::embeddings::EmbeddingProvider;
use recall_core::graph::{GraphStore, JobStore};
use recall_core::llm::LanguageModel;
use recall_core::pipeline::{IngestProcessor, IngestionPipeline};
use recall_core::queue::IngestQueue;
use recall_core::types::{JobStatus, QueueConfig};
use recall_core::DocumentIngester;
use recall_storage_turso::TursoGraphStore;
use test_utils::{chat_request, entities_output, ScriptedModel, StubEmbeddings};
use uuid::Uuid;

async fn wait_for_status(jobs: &Arc<TursoGraphStore>, id: Uuid, status: JobStatus) {
    for _ in 0..300 {
        let entry = jobs.get_entry(id).await.unwrap();
        if entry.map(|e| e.status) == Some(status) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("entry {id} never reached {status}");
}

struct Harness {
    store: Arc<TursoGraphStore>,
    model: Arc<ScriptedModel>,
    queue: Arc<IngestQueue>,
}

async fn harness() -> Harness {
    let store = Arc::new(TursoGraphStore::in_memory().await.unwrap());
    assert!(store.initialize_schema().await);
    let embeddings = Arc::new(StubEmbeddings::new(8));
    let model = Arc::new(ScriptedModel::new());

    let pipeline = Arc::new(IngestionPipeline::new(
        store.clone() as Arc<dyn GraphStore>,
        embeddings.clone() as Arc<dyn EmbeddingProvider>,
        model.clone() as Arc<dyn LanguageModel>,
    ));
    let documents = Arc::new(DocumentIngester::new(
        store.clone() as Arc<dyn GraphStore>,
        embeddings as Arc<dyn EmbeddingProvider>,
        pipeline.clone(),
    ));
    let processor = Arc::new(IngestProcessor::new(pipeline, documents));
    let queue = Arc::new(IngestQueue::new(
        QueueConfig::default(),
        processor,
        store.clone() as Arc<dyn JobStore>,
    ));
    Harness {
        store,
        model,
        queue,
    }
}

#[tokio::test]
async fn concurrent_submissions_for_one_user_process_in_order() {
    let h = harness().await;

    // Two jobs, two responses each (normalization + empty entity list)
    for _ in 0..2 {
        h.model.push_response("<output>noted</output>");
        h.model.push_response(entities_output(&[]));
    }

    let first = h
        .queue
        .submit("alice", "ws1", chat_request("the first episode body", "alice", Utc::now()))
        .await
        .unwrap();
    let second = h
        .queue
        .submit("alice", "ws1", chat_request("the second episode body", "alice", Utc::now()))
        .await
        .unwrap();

    wait_for_status(&h.store, first, JobStatus::Completed).await;
    wait_for_status(&h.store, second, JobStatus::Completed).await;

    // Per-user FIFO: all of job one's model calls precede job two's
    let calls = h.model.calls();
    assert_eq!(calls.len(), 4);
    assert!(calls[0]
        .messages
        .last()
        .unwrap()
        .content
        .contains("the first episode body"));
    assert!(calls[2]
        .messages
        .last()
        .unwrap()
        .content
        .contains("the second episode body"));

    // Entries carry the pipeline output
    let entry = h.store.get_entry(first).await.unwrap().unwrap();
    assert_eq!(entry.status, JobStatus::Completed);
    let output = entry.output.unwrap();
    assert_eq!(output["statementsCreated"], serde_json::json!(0));

    let page = h.store.list_entries("ws1", 1, 10).await.unwrap();
    assert_eq!(page.total, 2);
}

#[tokio::test]
async fn pipeline_failure_surfaces_in_the_entry() {
    let h = harness().await;
    // No canned responses: the scripted model errors on first use

    let id = h
        .queue
        .submit("alice", "ws1", chat_request("hello", "alice", Utc::now()))
        .await
        .unwrap();
    wait_for_status(&h.store, id, JobStatus::Failed).await;

    let entry = h.store.get_entry(id).await.unwrap().unwrap();
    assert!(entry.error.unwrap().contains("canned responses"));
    assert!(entry.output.is_none());
}
