//! Integration tests for the Turso graph store over an in-memory database.

use chrono::{Duration, TimeZone, Utc};
use recall_core::graph::{
    GraphStore, JobStore, RecentEpisodesQuery, SimilarEntityQuery, SimilarityEdge, SpaceStore,
    SpaceUpdate, StatementTriple,
};
use recall_core::types::{
    AssignmentMethod, Cluster, Document, Entity, Episode, EpisodeType, IngestionQueueEntry,
    JobStatus, Space, Statement,
};
use recall_storage_turso::TursoGraphStore;
use uuid::Uuid;

async fn store() -> TursoGraphStore {
    let store = TursoGraphStore::in_memory().await.unwrap();
    assert!(store.initialize_schema().await);
    store
}

fn episode(user_id: &str, content: &str) -> Episode {
    Episode::new(
        content.to_string(),
        content.to_string(),
        "chat".to_string(),
        Utc::now(),
        user_id.to_string(),
        EpisodeType::Conversation,
    )
}

fn triple(user_id: &str, subject: &str, predicate: &str, object: &str) -> StatementTriple {
    let mut statement = Statement::new(
        format!("{subject} {predicate} {object}"),
        Utc::now(),
        user_id.to_string(),
    );
    statement.fact_embedding = Some(vec![1.0, 0.0, 0.0]);
    let mut subject = Entity::new(subject.to_string(), user_id.to_string());
    subject.name_embedding = Some(vec![1.0, 0.0, 0.0]);
    let mut object = Entity::new(object.to_string(), user_id.to_string());
    object.name_embedding = Some(vec![0.0, 1.0, 0.0]);
    StatementTriple {
        statement,
        subject,
        predicate: Entity::predicate(predicate.to_string(), user_id.to_string()),
        object,
    }
}

#[tokio::test]
async fn schema_init_is_idempotent() {
    let store = TursoGraphStore::in_memory().await.unwrap();
    assert!(store.initialize_schema().await);
    assert!(store.initialize_schema().await);
}

#[tokio::test]
async fn episode_round_trip() {
    let store = store().await;
    let mut episode = episode("u1", "John lives in New York");
    episode.content_embedding = Some(vec![0.1, 0.2, 0.3]);
    episode.session_id = Some("c1".into());
    store.save_episode(&episode).await.unwrap();

    let loaded = store.get_episode("u1", episode.uuid).await.unwrap().unwrap();
    assert_eq!(loaded.content, episode.content);
    assert_eq!(loaded.session_id.as_deref(), Some("c1"));
    assert_eq!(loaded.content_embedding, episode.content_embedding);

    // Upsert does not duplicate
    store.save_episode(&episode).await.unwrap();
    assert!(store.get_episode("u1", episode.uuid).await.unwrap().is_some());

    // Scoped by user
    assert!(store.get_episode("u2", episode.uuid).await.unwrap().is_none());
}

#[tokio::test]
async fn triple_save_wires_all_edges() {
    let store = store().await;
    let episode = episode("u1", "ep");
    store.save_episode(&episode).await.unwrap();

    let t = triple("u1", "John", "lives_in", "New York");
    store.save_triple(episode.uuid, &t).await.unwrap();

    let hydrated = store
        .get_triple_for_statement(t.statement.uuid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hydrated.subject.name, "John");
    assert_eq!(hydrated.predicate.name, "lives_in");
    assert_eq!(hydrated.object.name, "New York");

    let from_episode = store.get_episode_statements(episode.uuid).await.unwrap();
    assert_eq!(from_episode.len(), 1);
    assert_eq!(from_episode[0].uuid, t.statement.uuid);
}

#[tokio::test]
async fn invalidation_clamps_and_skips_already_invalid() {
    let store = store().await;
    let episode = episode("u1", "ep");
    store.save_episode(&episode).await.unwrap();

    let mut t = triple("u1", "John", "lives_in", "NY");
    t.statement.valid_at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    store.save_triple(episode.uuid, &t).await.unwrap();

    let cause = Uuid::new_v4();
    let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let changed = store
        .invalidate_statements(&[t.statement.uuid], cause, earlier)
        .await
        .unwrap();
    assert_eq!(changed, 1);

    let loaded = store
        .get_triple_for_statement(t.statement.uuid)
        .await
        .unwrap()
        .unwrap()
        .statement;
    assert!(!loaded.is_valid());
    assert_eq!(loaded.invalidated_by, Some(cause));
    // invalid_at clamped up to valid_at
    assert!(loaded.valid_at <= loaded.invalid_at.unwrap());

    // Second invalidation is a no-op
    let changed = store
        .invalidate_statements(&[t.statement.uuid], Uuid::new_v4(), Utc::now())
        .await
        .unwrap();
    assert_eq!(changed, 0);
    let reloaded = store
        .get_triple_for_statement(t.statement.uuid)
        .await
        .unwrap()
        .unwrap()
        .statement;
    assert_eq!(reloaded.invalidated_by, Some(cause));
}

#[tokio::test]
async fn episode_deletion_cascades_to_sole_statements_and_orphans() {
    let store = store().await;
    let first = episode("u1", "first");
    let second = episode("u1", "second");
    store.save_episode(&first).await.unwrap();
    store.save_episode(&second).await.unwrap();

    // Statement evidenced only by `first`
    let sole = triple("u1", "John", "lives_in", "NY");
    store.save_triple(first.uuid, &sole).await.unwrap();

    // Statement evidenced by both episodes survives
    let shared = triple("u1", "Mary", "works_at", "Acme");
    store.save_triple(first.uuid, &shared).await.unwrap();
    store.save_triple(second.uuid, &shared).await.unwrap();

    let deletion = store.delete_episode("u1", first.uuid).await.unwrap();
    assert_eq!(deletion.statements_removed, 1);
    // John and NY orphaned; lives_in predicate orphaned too
    assert!(deletion.entities_removed >= 2);

    assert!(store
        .get_triple_for_statement(sole.statement.uuid)
        .await
        .unwrap()
        .is_none());
    assert!(store
        .get_triple_for_statement(shared.statement.uuid)
        .await
        .unwrap()
        .is_some());
    assert!(store.get_episode("u1", first.uuid).await.unwrap().is_none());
}

#[tokio::test]
async fn recent_episodes_respect_window_and_session() {
    let store = store().await;
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    for i in 0..8 {
        let mut e = episode("u1", &format!("episode {i}"));
        e.valid_at = base + Duration::hours(i);
        e.session_id = Some("c1".into());
        store.save_episode(&e).await.unwrap();
    }
    // An episode after the reference time must not appear
    let mut late = episode("u1", "late");
    late.valid_at = base + Duration::days(30);
    late.session_id = Some("c1".into());
    store.save_episode(&late).await.unwrap();

    let recent = store
        .get_recent_episodes(&RecentEpisodesQuery {
            user_id: "u1".into(),
            source: Some("chat".into()),
            session_id: Some("c1".into()),
            before: base + Duration::hours(10),
            limit: 5,
        })
        .await
        .unwrap();

    assert_eq!(recent.len(), 5);
    assert_eq!(recent[0].content, "episode 7"); // newest first
}

#[tokio::test]
async fn predicate_matching_is_case_insensitive() {
    let store = store().await;
    let episode = episode("u1", "ep");
    store.save_episode(&episode).await.unwrap();
    let t = triple("u1", "John", "Lives_In", "NY");
    store.save_triple(episode.uuid, &t).await.unwrap();

    let matches = store
        .find_exact_predicate_matches("lives_in", "u1")
        .await
        .unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].name, "Lives_In");

    assert!(store
        .find_exact_predicate_matches("lives_in", "u2")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn similar_entities_rank_by_cosine() {
    let store = store().await;
    let mut close = Entity::new("New York".into(), "u1".into());
    close.name_embedding = Some(vec![1.0, 0.0]);
    let mut far = Entity::new("Tokyo".into(), "u1".into());
    far.name_embedding = Some(vec![0.0, 1.0]);
    store.save_entity(&close).await.unwrap();
    store.save_entity(&far).await.unwrap();

    let scored = store
        .find_similar_entities(&SimilarEntityQuery {
            embedding: vec![1.0, 0.1],
            limit: 5,
            threshold: 0.7,
            user_id: "u1".into(),
            entity_type: None,
        })
        .await
        .unwrap();
    assert_eq!(scored.len(), 1);
    assert_eq!(scored[0].entity.name, "New York");
}

#[tokio::test]
async fn structural_statement_lookups() {
    let store = store().await;
    let e = episode("u1", "ep");
    store.save_episode(&e).await.unwrap();

    let lives = triple("u1", "John", "lives_in", "NY");
    store.save_triple(e.uuid, &lives).await.unwrap();

    // Same subject+predicate probe finds it
    let direct = store
        .find_contradictory_statements(lives.subject.uuid, lives.predicate.uuid, "u1")
        .await
        .unwrap();
    assert_eq!(direct.len(), 1);

    // Same subject+object with predicate excluded does not
    let dimensional = store
        .find_statements_with_same_subject_object(
            lives.subject.uuid,
            lives.object.uuid,
            Some(lives.predicate.uuid),
            "u1",
        )
        .await
        .unwrap();
    assert!(dimensional.is_empty());
}

#[tokio::test]
async fn document_version_chain_and_chunk_statements() {
    let store = store().await;
    let now = Utc::now();
    let v1 = Document {
        uuid: Uuid::new_v4(),
        title: "guide".into(),
        original_content: "v1".into(),
        source: "upload".into(),
        user_id: "u1".into(),
        session_id: "doc-1".into(),
        version: 1,
        content_hash: "aaaa".into(),
        chunk_hashes: vec!["h1".into(), "h2".into()],
        previous_version_uuid: None,
        total_chunks: 2,
        created_at: now,
        updated_at: now,
    };
    store.save_document(&v1).await.unwrap();

    let mut v2 = v1.clone();
    v2.uuid = Uuid::new_v4();
    v2.version = 2;
    v2.content_hash = "bbbb".into();
    v2.previous_version_uuid = Some(v1.uuid);
    store.save_document(&v2).await.unwrap();

    let latest = store.latest_document("u1", "doc-1").await.unwrap().unwrap();
    assert_eq!(latest.version, 2);
    assert_eq!(latest.previous_version_uuid, Some(v1.uuid));

    // Chunk 0 episode carries one statement; chunk 1 another
    let chunk0 = episode("u1", "chunk zero");
    let chunk1 = episode("u1", "chunk one");
    store.save_episode(&chunk0).await.unwrap();
    store.save_episode(&chunk1).await.unwrap();
    store
        .link_episode_to_document(chunk0.uuid, v1.uuid, 0)
        .await
        .unwrap();
    store
        .link_episode_to_document(chunk1.uuid, v1.uuid, 1)
        .await
        .unwrap();
    let t0 = triple("u1", "A", "p", "B");
    let t1 = triple("u1", "C", "q", "D");
    store.save_triple(chunk0.uuid, &t0).await.unwrap();
    store.save_triple(chunk1.uuid, &t1).await.unwrap();

    let all = store.document_statements(v1.uuid).await.unwrap();
    assert_eq!(all.len(), 2);

    let only_chunk1 = store
        .document_chunk_statements(v1.uuid, &[1])
        .await
        .unwrap();
    assert_eq!(only_chunk1.len(), 1);
    assert_eq!(only_chunk1[0].uuid, t1.statement.uuid);
}

#[tokio::test]
async fn similarity_edges_are_ephemeral() {
    let store = store().await;
    let s1 = Uuid::new_v4();
    let s2 = Uuid::new_v4();
    let edges = vec![SimilarityEdge {
        source: s1.min(s2),
        target: s1.max(s2),
        weight: 4.0,
        shared_entities: vec![Uuid::new_v4(), Uuid::new_v4()],
    }];
    store.merge_similarity_edges("u1", &edges).await.unwrap();

    let loaded = store.similarity_edges("u1").await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].weight, 4.0);
    assert_eq!(loaded[0].shared_entities.len(), 2);

    store.drop_similarity_edges("u1").await.unwrap();
    assert!(store.similarity_edges("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn cluster_round_trip_and_assignment() {
    let store = store().await;
    let e = episode("u1", "ep");
    store.save_episode(&e).await.unwrap();
    let t = triple("u1", "John", "drinks", "coffee");
    store.save_triple(e.uuid, &t).await.unwrap();

    let cluster_id = Uuid::new_v4();
    let mut cluster = Cluster::unnamed(cluster_id, "u1".into(), recall_core::AspectType::Thematic);
    cluster.size = 1;
    cluster.cluster_embedding = Some(vec![1.0, 0.0, 0.0]);
    store.save_cluster(&cluster).await.unwrap();

    store
        .assign_cluster(&[t.statement.uuid], cluster_id)
        .await
        .unwrap();
    let members = store.cluster_members(cluster_id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].cluster_id, Some(cluster_id));

    // Unclustered set is now empty
    assert!(store
        .unclustered_valid_statements("u1")
        .await
        .unwrap()
        .is_empty());

    store.clear_cluster_assignments("u1").await.unwrap();
    assert_eq!(store.unclustered_valid_statements("u1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn queue_entry_lifecycle_is_guarded() {
    let store = store().await;
    let entry = IngestionQueueEntry::pending(
        "ws1".into(),
        None,
        serde_json::json!({"episodeBody": "hello"}),
    );
    store.create_entry(&entry).await.unwrap();

    // COMPLETED before PROCESSING is illegal
    assert!(store
        .complete(entry.id, serde_json::json!({"ok": true}))
        .await
        .is_err());

    store.mark_processing(entry.id).await.unwrap();
    store
        .complete(entry.id, serde_json::json!({"ok": true}))
        .await
        .unwrap();

    let loaded = store.get_entry(entry.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Completed);
    assert_eq!(loaded.output, Some(serde_json::json!({"ok": true})));

    // Terminal states are frozen
    assert!(store.fail(entry.id, "late failure").await.is_err());
}

#[tokio::test]
async fn pending_entries_recover_in_creation_order() {
    let store = store().await;
    let mut ids = Vec::new();
    for i in 0..3 {
        let mut entry = IngestionQueueEntry::pending(
            "ws1".into(),
            None,
            serde_json::json!({"n": i}),
        );
        entry.created_at = Utc::now() + Duration::milliseconds(i);
        entry.updated_at = entry.created_at;
        store.create_entry(&entry).await.unwrap();
        ids.push(entry.id);
    }

    let pending = store.pending_entries().await.unwrap();
    let pending_ids: Vec<Uuid> = pending.iter().map(|e| e.id).collect();
    assert_eq!(pending_ids, ids);
}

#[tokio::test]
async fn space_name_unique_per_workspace() {
    let store = store().await;
    let space = Space::new("Work".into(), String::new(), "u1".into(), "ws1".into());
    store.create_space(&space).await.unwrap();

    let duplicate = Space::new("Work".into(), String::new(), "u1".into(), "ws1".into());
    assert!(store.create_space(&duplicate).await.is_err());

    // Same name in another workspace is fine
    let other = Space::new("Work".into(), String::new(), "u1".into(), "ws2".into());
    store.create_space(&other).await.unwrap();
}

#[tokio::test]
async fn space_trigger_claim_fires_once() {
    let store = store().await;
    let space = Space::new("Focus".into(), String::new(), "u1".into(), "ws1".into());
    store.create_space(&space).await.unwrap();

    // First claim against the never-analysed state
    assert!(store
        .try_claim_pattern_trigger(space.uuid, None, 150)
        .await
        .unwrap());
    // A racer holding the same expectation loses
    assert!(!store
        .try_claim_pattern_trigger(space.uuid, None, 150)
        .await
        .unwrap());
    // The next growth claim works from the stored count
    assert!(store
        .try_claim_pattern_trigger(space.uuid, Some(150), 260)
        .await
        .unwrap());
}

#[tokio::test]
async fn space_deletion_scrubs_statement_membership() {
    let store = store().await;
    let e = episode("u1", "ep");
    store.save_episode(&e).await.unwrap();
    let t = triple("u1", "John", "enjoys", "climbing");
    store.save_triple(e.uuid, &t).await.unwrap();

    let space_id = Uuid::new_v4();
    store
        .add_statements_to_space(&[t.statement.uuid], space_id, AssignmentMethod::Manual)
        .await
        .unwrap();
    let members = store.get_space_statements("u1", space_id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(
        members[0].space_assignment_method,
        Some(AssignmentMethod::Manual)
    );

    let scrubbed = store.scrub_space("u1", space_id).await.unwrap();
    assert_eq!(scrubbed, 1);
    assert!(store
        .get_space_statements("u1", space_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn space_update_patches_fields() {
    let store = store().await;
    let space = Space::new("Old".into(), "desc".into(), "u1".into(), "ws1".into());
    store.create_space(&space).await.unwrap();

    let updated = store
        .update_space(
            space.uuid,
            &SpaceUpdate {
                name: Some("New".into()),
                description: None,
                is_active: Some(false),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "New");
    assert_eq!(updated.description, "desc");
    assert!(!updated.is_active);
}

#[tokio::test]
async fn fulltext_search_finds_statements() {
    let store = store().await;
    let e = episode("u1", "ep");
    store.save_episode(&e).await.unwrap();
    let t = triple("u1", "John", "lives_in", "Amsterdam");
    store.save_triple(e.uuid, &t).await.unwrap();

    let hits = store
        .search_statements_by_text("Amsterdam", "u1", 10)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);

    let entity_hits = store
        .search_entities_by_name("Amsterdam", "u1", 10)
        .await
        .unwrap();
    assert!(!entity_hits.is_empty());
}
