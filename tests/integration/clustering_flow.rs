//! Clustering engine scenarios: complete runs, minimum-size filtering,
//! drift detection, and split evolution.

use chrono::Utc;
use std::sync::Arc;

use recall_core::clustering::{ClusteringEngine, ClusteringMode};
use recall_core::graph::{GraphStore, StatementTriple};
use recall_core::llm::LanguageModel;
use recall_core::types::{AspectType, Cluster, ClusteringConfig, Entity, Episode, EpisodeType, Statement};
use recall_storage_turso::TursoGraphStore;
use test_utils::ScriptedModel;
use uuid::Uuid;

const DIM: usize = 8;

fn basis(index: usize) -> Vec<f32> {
    let mut vector = vec![0.0; DIM];
    vector[index] = 1.0;
    vector
}

struct Harness {
    graph: Arc<TursoGraphStore>,
    model: Arc<ScriptedModel>,
    engine: ClusteringEngine,
}

async fn harness() -> Harness {
    let graph = Arc::new(TursoGraphStore::in_memory().await.unwrap());
    assert!(graph.initialize_schema().await);
    let model = Arc::new(ScriptedModel::new());
    let engine = ClusteringEngine::new(
        graph.clone() as Arc<dyn GraphStore>,
        model.clone() as Arc<dyn LanguageModel>,
        ClusteringConfig::default(),
    );
    Harness {
        graph,
        model,
        engine,
    }
}

async fn seed_episode(graph: &TursoGraphStore, user: &str) -> Episode {
    let episode = Episode::new(
        "seed".into(),
        "seed".into(),
        "chat".into(),
        Utc::now(),
        user.to_string(),
        EpisodeType::Conversation,
    );
    graph.save_episode(&episode).await.unwrap();
    episode
}

/// Shared entities anchoring one similarity clique
struct Anchor {
    object: Entity,
    predicate: Entity,
}

fn anchor(user: &str, object_name: &str, predicate_name: &str) -> Anchor {
    Anchor {
        object: Entity::new(object_name.to_string(), user.to_string()),
        predicate: Entity::predicate(predicate_name.to_string(), user.to_string()),
    }
}

/// Seed `count` statements that all share the anchor's object and predicate
/// entities, so they form a similarity clique. Returns the statement uuids.
async fn seed_group(
    graph: &TursoGraphStore,
    episode: &Episode,
    user: &str,
    anchor: &Anchor,
    count: usize,
    offset: usize,
    fact_embedding: Vec<f32>,
) -> Vec<Uuid> {
    let mut ids = Vec::with_capacity(count);
    for i in offset..offset + count {
        let mut statement = Statement::new(
            format!("person{i} {} {}", anchor.predicate.name, anchor.object.name),
            Utc::now(),
            user.to_string(),
        );
        statement.fact_embedding = Some(fact_embedding.clone());
        ids.push(statement.uuid);
        let triple = StatementTriple {
            statement,
            subject: Entity::new(
                format!("{}-person{i}", anchor.object.name),
                user.to_string(),
            ),
            predicate: anchor.predicate.clone(),
            object: anchor.object.clone(),
        };
        graph.save_triple(episode.uuid, &triple).await.unwrap();
    }
    ids
}

#[tokio::test]
async fn complete_clustering_keeps_only_big_communities() {
    let h = harness().await;
    let episode = seed_episode(&h.graph, "u1").await;

    // 15 statements around coffee, 8 around git
    let coffee = anchor("u1", "coffee", "drinks");
    let git = anchor("u1", "git", "uses");
    seed_group(&h.graph, &episode, "u1", &coffee, 15, 0, basis(0)).await;
    seed_group(&h.graph, &episode, "u1", &git, 8, 0, basis(1)).await;

    h.model
        .push_output(r#"{"name": "Coffee Rituals", "description": "How the user takes their coffee"}"#);

    let outcome = h.engine.perform_clustering("u1", true).await.unwrap();
    assert_eq!(outcome.mode, Some(ClusteringMode::Complete));
    assert_eq!(outcome.clusters_created.len(), 1);
    assert_eq!(outcome.statements_clustered, 15);

    let clusters = h.graph.get_clusters("u1").await.unwrap();
    assert_eq!(clusters.len(), 1);
    let cluster = &clusters[0];
    assert_eq!(cluster.size, 15);
    assert_eq!(cluster.name, "Coffee Rituals");
    assert!(!cluster.needs_naming);
    assert!(cluster.top_objects.contains(&"coffee".to_string()));
    assert!(cluster.top_predicates.contains(&"drinks".to_string()));

    // Size matches actual membership right after the run
    let members = h.graph.cluster_members(cluster.uuid).await.unwrap();
    assert_eq!(members.len(), cluster.size);

    // The git group fell under the minimum and stayed unclustered
    let unclustered = h.graph.unclustered_valid_statements("u1").await.unwrap();
    assert_eq!(unclustered.len(), 8);

    // The SIMILAR_TO projection was dropped at the end of the run
    assert!(h.graph.similarity_edges("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn centroid_is_mean_of_member_embeddings() {
    let h = harness().await;
    let episode = seed_episode(&h.graph, "u1").await;
    let coffee = anchor("u1", "coffee", "drinks");
    seed_group(&h.graph, &episode, "u1", &coffee, 12, 0, basis(0)).await;

    h.model
        .push_output(r#"{"name": "Coffee", "description": "coffee facts"}"#);
    h.engine.perform_clustering("u1", true).await.unwrap();

    let clusters = h.graph.get_clusters("u1").await.unwrap();
    let centroid = clusters[0].cluster_embedding.as_ref().unwrap();
    assert!((centroid[0] - 1.0).abs() < 1e-5);
    assert_eq!(clusters[0].embedding_count, 12);
}

#[tokio::test]
async fn unparseable_naming_falls_back_to_uuid_prefix() {
    let h = harness().await;
    let episode = seed_episode(&h.graph, "u1").await;
    let coffee = anchor("u1", "coffee", "drinks");
    seed_group(&h.graph, &episode, "u1", &coffee, 12, 0, basis(0)).await;

    h.model.push_response("no envelope in sight");
    h.engine.perform_clustering("u1", true).await.unwrap();

    let clusters = h.graph.get_clusters("u1").await.unwrap();
    let cluster = &clusters[0];
    assert_eq!(
        cluster.name,
        format!("Cluster {}", &cluster.uuid.to_string()[..8])
    );
    assert!(!cluster.needs_naming);
}

#[tokio::test]
async fn drifted_cluster_splits_into_successors() {
    let h = harness().await;
    let episode = seed_episode(&h.graph, "u1").await;

    // Two internally tight subgroups crammed into one cluster
    let espresso_anchor = anchor("u1", "espresso", "prefers");
    let tea_anchor = anchor("u1", "tea", "brews");
    let espresso =
        seed_group(&h.graph, &episode, "u1", &espresso_anchor, 12, 0, basis(0)).await;
    let tea = seed_group(&h.graph, &episode, "u1", &tea_anchor, 12, 0, basis(1)).await;

    let old_id = Uuid::new_v4();
    let mut old = Cluster::unnamed(old_id, "u1".into(), AspectType::Social);
    old.name = "Beverages".into();
    old.needs_naming = false;
    old.size = 24;
    // Centroid pointing nowhere near either subgroup → cohesion 0
    old.cluster_embedding = Some(basis(2));
    old.embedding_count = 24;
    h.graph.save_cluster(&old).await.unwrap();
    let all: Vec<Uuid> = espresso.iter().chain(tea.iter()).copied().collect();
    h.graph.assign_cluster(&all, old_id).await.unwrap();

    // Two successors need names
    h.model
        .push_output(r#"{"name": "Espresso", "description": "espresso preferences"}"#);
    h.model
        .push_output(r#"{"name": "Tea", "description": "tea brewing"}"#);

    let outcome = h.engine.perform_clustering("u1", false).await.unwrap();
    assert_eq!(outcome.mode, Some(ClusteringMode::Incremental));
    assert_eq!(outcome.drifted, vec![old_id]);
    assert_eq!(outcome.evolved, vec![old_id]);
    assert_eq!(outcome.clusters_created.len(), 2);

    // The old cluster is marked evolved and has SPLIT_INTO edges
    let old_loaded = h.graph.get_cluster(old_id).await.unwrap().unwrap();
    assert!(old_loaded.evolved);
    assert!(old_loaded.evolved_at.is_some());
    let splits = h.graph.cluster_splits(old_id).await.unwrap();
    assert_eq!(splits.len(), 2);
    for (_, split) in &splits {
        assert_eq!(split.reason, "low_cohesion");
        assert_eq!(split.original_size, 24);
        assert_eq!(split.new_size, 12);
    }

    // Members moved to the successors; the aspect type is inherited
    assert!(h.graph.cluster_members(old_id).await.unwrap().is_empty());
    for successor in &outcome.clusters_created {
        let cluster = h.graph.get_cluster(*successor).await.unwrap().unwrap();
        assert_eq!(cluster.aspect_type, AspectType::Social);
        assert_eq!(cluster.size, 12);
        let members = h.graph.cluster_members(*successor).await.unwrap();
        assert_eq!(members.len(), cluster.size);
    }
}

#[tokio::test]
async fn undersized_drifted_cluster_is_kept() {
    let h = harness().await;
    let episode = seed_episode(&h.graph, "u1").await;

    // 19 members: one short of the 2×MIN_CLUSTER_SIZE split floor
    let espresso_anchor = anchor("u1", "espresso", "prefers");
    let tea_anchor = anchor("u1", "tea", "brews");
    let a = seed_group(&h.graph, &episode, "u1", &espresso_anchor, 10, 0, basis(0)).await;
    let b = seed_group(&h.graph, &episode, "u1", &tea_anchor, 9, 0, basis(1)).await;

    let old_id = Uuid::new_v4();
    let mut old = Cluster::unnamed(old_id, "u1".into(), AspectType::Thematic);
    old.needs_naming = false;
    old.size = 19;
    old.cluster_embedding = Some(basis(2));
    h.graph.save_cluster(&old).await.unwrap();
    let all: Vec<Uuid> = a.iter().chain(b.iter()).copied().collect();
    h.graph.assign_cluster(&all, old_id).await.unwrap();

    let outcome = h.engine.perform_clustering("u1", false).await.unwrap();

    // Drift detected, but the cluster is too small to split
    assert_eq!(outcome.drifted, vec![old_id]);
    assert!(outcome.evolved.is_empty());
    let old_loaded = h.graph.get_cluster(old_id).await.unwrap().unwrap();
    assert!(!old_loaded.evolved);
    assert!(h.graph.cluster_splits(old_id).await.unwrap().is_empty());
    assert_eq!(h.graph.cluster_members(old_id).await.unwrap().len(), 19);
    // Cohesion was recorded during drift detection
    assert!(old_loaded.cohesion_score.unwrap() < 0.6);
}

#[tokio::test]
async fn incremental_run_attaches_new_statements_to_existing_cluster() {
    let h = harness().await;
    let episode = seed_episode(&h.graph, "u1").await;
    let coffee = anchor("u1", "coffee", "drinks");
    seed_group(&h.graph, &episode, "u1", &coffee, 12, 0, basis(0)).await;

    h.model
        .push_output(r#"{"name": "Coffee", "description": "coffee facts"}"#);
    let first = h.engine.perform_clustering("u1", true).await.unwrap();
    let cluster_id = first.clusters_created[0];

    // More statements about the same entities arrive later
    seed_group(&h.graph, &episode, "u1", &coffee, 5, 12, basis(0)).await;

    let second = h.engine.perform_clustering("u1", false).await.unwrap();
    assert_eq!(second.mode, Some(ClusteringMode::Incremental));
    assert_eq!(second.statements_clustered, 5);
    assert!(second.clusters_created.is_empty());
    assert_eq!(second.clusters_updated, vec![cluster_id]);

    let cluster = h.graph.get_cluster(cluster_id).await.unwrap().unwrap();
    assert_eq!(cluster.size, 17);
    assert_eq!(
        h.graph.cluster_members(cluster_id).await.unwrap().len(),
        17
    );
}
