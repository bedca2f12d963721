//! End-to-end ingestion pipeline scenarios over an in-memory graph store
//! with scripted model and embedding fakes.

use chrono::{TimeZone, Utc};
use std::sync::Arc;

use recall_core::embeddings::EmbeddingProvider;
use recall_core::graph::GraphStore;
use recall_core::llm::{LanguageModel, Message};
use recall_core::pipeline::IngestionPipeline;
use recall_core::types::IngestRequest;
use recall_storage_turso::TursoGraphStore;
use test_utils::{chat_request, entities_output, triples_output, ScriptedModel, StubEmbeddings};

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
    pipeline: IngestionPipeline,
}

async fn harness() -> Harness {
    let graph = Arc::new(TursoGraphStore::in_memory().await.unwrap());
    assert!(graph.initialize_schema().await);
    let embeddings = Arc::new(StubEmbeddings::new(DIM));
    let model = Arc::new(ScriptedModel::new());

    let pipeline = IngestionPipeline::new(
        graph.clone() as Arc<dyn GraphStore>,
        embeddings.clone() as Arc<dyn EmbeddingProvider>,
        model.clone() as Arc<dyn LanguageModel>,
    );
    Harness {
        graph,
        embeddings,
        model,
        pipeline,
    }
}

/// Pin every vector the scenario depends on so similarity relationships are
/// exact instead of hash noise
fn pin_scenario_vectors(embeddings: &StubEmbeddings) {
    embeddings.register("John", basis(0));
    embeddings.register("New York", basis(1));
    embeddings.register("San Francisco", basis(2));
    embeddings.register("lives_in", basis(3));
    embeddings.register("John lives in New York", basis(4));
    embeddings.register("John lives in San Francisco", basis(5));
}

fn first_request(user: &str) -> IngestRequest {
    let mut request = chat_request(
        "John lives in New York",
        user,
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    );
    request.session_id = Some("c1".into());
    request
}

fn second_request(user: &str) -> IngestRequest {
    let mut request = chat_request(
        "John lives in San Francisco",
        user,
        Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
    );
    request.session_id = Some("c1".into());
    request
}

fn queue_first_ingest(model: &ScriptedModel) {
    model.push_response("<output>John lives in New York</output>");
    model.push_response(entities_output(&["John", "New York"]));
    model.push_response(triples_output(&[(
        "John",
        "lives_in",
        "New York",
        "John lives in New York",
    )]));
}

/// Extract the uuids listed under a section header of the resolution prompt
fn listed_uuids(messages: &[Message], section: &str) -> Vec<String> {
    let content = &messages.last().unwrap().content;
    let start = content.find(section).unwrap() + section.len();
    content[start..]
        .lines()
        .take_while(|line| !line.ends_with(':'))
        .filter_map(|line| {
            line.strip_prefix("- ")
                .and_then(|rest| rest.split(" | ").next())
                .map(str::to_string)
        })
        .collect()
}

#[tokio::test]
async fn superseding_fact_invalidates_the_old_statement() {
    let h = harness().await;
    pin_scenario_vectors(&h.embeddings);

    // Episode 1: (John, lives_in, New York)
    queue_first_ingest(&h.model);
    let first = h.pipeline.run("u1", &first_request("u1")).await.unwrap();
    assert_eq!(first.statements_created, 1);
    assert_eq!(first.statements_invalidated, 0);
    let first_episode = first.episode_uuid.unwrap();
    let first_statement = first.statement_uuids[0];

    // Episode 2: (John, lives_in, San Francisco) contradicts episode 1
    h.model
        .push_response("<output>John lives in San Francisco</output>");
    h.model
        .push_response(entities_output(&["John", "San Francisco"]));
    h.model.push_response(triples_output(&[(
        "John",
        "lives_in",
        "San Francisco",
        "John lives in San Francisco",
    )]));
    // Entity dedup: John resolves to the stored entity, San Francisco is new
    h.model.push_output(
        r#"[{"id": 0, "name": "John", "duplicate_idx": 0},
            {"id": 1, "name": "San Francisco", "duplicate_idx": -1}]"#,
    );
    // Resolution verdict: contradiction against whatever candidate was shown
    h.model.push_dynamic(|messages| {
        let new = listed_uuids(messages, "New statements:\n");
        let existing = listed_uuids(messages, "Existing statements:\n");
        format!(
            "<output>[{{\"statementId\": \"{}\", \"isDuplicate\": false, \
             \"contradictions\": [\"{}\"]}}]</output>",
            new[0], existing[0]
        )
    });

    let second = h.pipeline.run("u1", &second_request("u1")).await.unwrap();
    assert_eq!(second.statements_created, 1);
    assert_eq!(second.statements_invalidated, 1);
    let second_episode = second.episode_uuid.unwrap();
    assert_ne!(first_episode, second_episode);

    // The first statement now carries the superseding episode as its cause
    let old = h
        .graph
        .get_triple_for_statement(first_statement)
        .await
        .unwrap()
        .unwrap()
        .statement;
    assert!(!old.is_valid());
    assert_eq!(old.invalidated_by, Some(second_episode));
    assert!(old.valid_at <= old.invalid_at.unwrap());

    // The new statement is valid and reuses the stored John entity
    let new = h
        .graph
        .get_triple_for_statement(second.statement_uuids[0])
        .await
        .unwrap()
        .unwrap();
    assert!(new.statement.is_valid());
    let old_triple = h
        .graph
        .get_triple_for_statement(first_statement)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(new.subject.uuid, old_triple.subject.uuid);
    assert_eq!(new.predicate.uuid, old_triple.predicate.uuid);
}

#[tokio::test]
async fn nothing_to_remember_persists_nothing() {
    let h = harness().await;
    h.model.push_response("NOTHING_TO_REMEMBER");

    let outcome = h
        .pipeline
        .run("u1", &chat_request("Looking forward to reading!", "u1", Utc::now()))
        .await
        .unwrap();

    assert_eq!(outcome.statements_created, 0);
    assert!(outcome.episode_uuid.is_none());
    assert_eq!(h.graph.statement_count("u1").await.unwrap(), 0);
    assert!(h.graph.valid_statements("u1").await.unwrap().is_empty());
    // Only the normalization call happened
    assert_eq!(h.model.call_count(), 1);
}

#[tokio::test]
async fn sentinel_inside_envelope_also_short_circuits() {
    let h = harness().await;
    h.model
        .push_response("reasoning first <output>NOTHING_TO_REMEMBER</output>");

    let outcome = h
        .pipeline
        .run("u1", &chat_request("ok thanks!", "u1", Utc::now()))
        .await
        .unwrap();
    assert_eq!(outcome.statements_created, 0);
    assert!(outcome.episode_uuid.is_none());
}

#[tokio::test]
async fn unparseable_resolver_output_keeps_all_triples() {
    let h = harness().await;
    pin_scenario_vectors(&h.embeddings);

    queue_first_ingest(&h.model);
    let first = h.pipeline.run("u1", &first_request("u1")).await.unwrap();
    let first_statement = first.statement_uuids[0];

    h.model
        .push_response("<output>John lives in San Francisco</output>");
    h.model
        .push_response(entities_output(&["John", "San Francisco"]));
    h.model.push_response(triples_output(&[(
        "John",
        "lives_in",
        "San Francisco",
        "John lives in San Francisco",
    )]));
    // Both verdicts come back without an <output> block
    h.model.push_response("I could not decide, sorry.");
    h.model.push_response("still no tags here");

    let second = h.pipeline.run("u1", &second_request("u1")).await.unwrap();

    // Conservative on both fronts: triple added, nothing invalidated
    assert_eq!(second.statements_created, 1);
    assert_eq!(second.statements_invalidated, 0);
    assert_eq!(second.duplicates_found, 0);
    let old = h
        .graph
        .get_triple_for_statement(first_statement)
        .await
        .unwrap()
        .unwrap()
        .statement;
    assert!(old.is_valid());
}

#[tokio::test]
async fn duplicate_verdict_reuses_the_existing_statement() {
    let h = harness().await;
    pin_scenario_vectors(&h.embeddings);

    queue_first_ingest(&h.model);
    let first = h.pipeline.run("u1", &first_request("u1")).await.unwrap();
    let existing_statement = first.statement_uuids[0];

    // Restating the same fact
    h.model
        .push_response("<output>John lives in New York</output>");
    h.model
        .push_response(entities_output(&["John", "New York"]));
    h.model.push_response(triples_output(&[(
        "John",
        "lives_in",
        "New York",
        "John lives in New York",
    )]));
    h.model.push_output(
        r#"[{"id": 0, "name": "John", "duplicate_idx": 0},
            {"id": 1, "name": "New York", "duplicate_idx": 0}]"#,
    );
    h.model.push_dynamic(|messages| {
        let new = listed_uuids(messages, "New statements:\n");
        let existing = listed_uuids(messages, "Existing statements:\n");
        format!(
            "<output>[{{\"statementId\": \"{}\", \"isDuplicate\": true, \
             \"duplicateId\": \"{}\", \"contradictions\": []}}]</output>",
            new[0], existing[0]
        )
    });

    let mut request = first_request("u1");
    request.reference_time = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let second = h.pipeline.run("u1", &request).await.unwrap();

    assert_eq!(second.statements_created, 0);
    assert_eq!(second.duplicates_found, 1);
    assert_eq!(second.statements_invalidated, 0);
    // The output set points at the surviving original statement
    assert_eq!(second.statement_uuids, vec![existing_statement]);
    // Idempotence at the graph level: still exactly one valid statement
    assert_eq!(h.graph.statement_count("u1").await.unwrap(), 1);
}

#[tokio::test]
async fn metrics_track_tiers_and_steps() {
    let h = harness().await;
    pin_scenario_vectors(&h.embeddings);

    queue_first_ingest(&h.model);
    let outcome = h.pipeline.run("u1", &first_request("u1")).await.unwrap();

    // Normalization + both extractions run on the high tier
    assert!(outcome.metrics.tokens.high.total > 0);
    let steps: Vec<&str> = outcome
        .metrics
        .steps
        .iter()
        .map(|s| s.step.as_str())
        .collect();
    assert!(steps.contains(&"normalization"));
    assert!(steps.contains(&"persistence"));
}

#[tokio::test]
async fn event_date_attribute_overrides_statement_validity() {
    let h = harness().await;
    pin_scenario_vectors(&h.embeddings);

    h.model.push_response("<output>John moved to New York</output>");
    h.model.push_response(entities_output(&["John", "New York"]));
    h.model.push_response(
        r#"<output>[{"source": "John", "predicate": "moved_to", "target": "New York",
            "fact": "John moved to New York",
            "attributes": {"event_date": "2023-06-15T00:00:00Z"}}]</output>"#,
    );

    let outcome = h
        .pipeline
        .run(
            "u1",
            &chat_request(
                "John moved to New York",
                "u1",
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            ),
        )
        .await
        .unwrap();

    let statement = h
        .graph
        .get_triple_for_statement(outcome.statement_uuids[0])
        .await
        .unwrap()
        .unwrap()
        .statement;
    assert_eq!(
        statement.valid_at,
        Utc.with_ymd_and_hms(2023, 6, 15, 0, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn self_loops_are_rejected_at_extraction() {
    let h = harness().await;

    h.model.push_response("<output>John knows himself</output>");
    h.model.push_response(entities_output(&["John"]));
    h.model.push_response(triples_output(&[(
        "John",
        "knows",
        "John",
        "John knows John",
    )]));

    let outcome = h
        .pipeline
        .run("u1", &chat_request("John knows himself", "u1", Utc::now()))
        .await
        .unwrap();

    // Episode persisted, but the self-loop produced no statement
    assert!(outcome.episode_uuid.is_some());
    assert_eq!(outcome.statements_created, 0);
}
