//! # Clustering Engine
//!
//! Orchestrates a clustering run: similarity-graph projection, Leiden,
//! finalisation under the minimum-size rule, cluster metadata and naming,
//! cohesion drift detection, and split evolution. Runs out of band from
//! ingestion; per-cluster failures are logged and siblings continue.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::leiden::{leiden, LeidenParams};
use super::naming::{distinctive_terms, ClusterTerms, DistinctiveTerms};
use super::similarity::{build_similarity_edges, restrict_pairs};
use crate::embeddings::{centroid, cosine_similarity};
use crate::error::Result;
use crate::graph::{ClusterSplit, GraphStore};
use crate::llm::{prompts, Complexity, LanguageModel};
use crate::types::{AspectType, Cluster, ClusteringConfig, Statement};
use serde::Deserialize;

/// How a clustering run was scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusteringMode {
    /// Drop everything and rebuild from scratch
    Complete,
    /// Cluster only unassigned statements, then check for drift
    Incremental,
}

/// Explicit delta of one clustering run
#[derive(Debug, Default)]
pub struct ClusteringOutcome {
    pub mode: Option<ClusteringMode>,
    /// Clusters minted in this run
    pub clusters_created: Vec<Uuid>,
    /// Existing clusters that gained members
    pub clusters_updated: Vec<Uuid>,
    /// Statements assigned a cluster in this run
    pub statements_clustered: usize,
    /// Clusters whose cohesion fell below the threshold
    pub drifted: Vec<Uuid>,
    /// Clusters split into successors
    pub evolved: Vec<Uuid>,
}

/// `{name, description}` payload of the naming prompt
#[derive(Debug, Deserialize)]
struct NamingVerdict {
    name: String,
    description: String,
}

/// Community clustering over one user's valid statements
pub struct ClusteringEngine {
    graph: Arc<dyn GraphStore>,
    model: Arc<dyn LanguageModel>,
    config: ClusteringConfig,
}

impl ClusteringEngine {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        model: Arc<dyn LanguageModel>,
        config: ClusteringConfig,
    ) -> Self {
        Self {
            graph,
            model,
            config,
        }
    }

    fn leiden_params(&self) -> LeidenParams {
        LeidenParams {
            gamma: self.config.gamma,
            max_levels: self.config.max_levels,
            tolerance: self.config.tolerance,
        }
    }

    /// Run clustering for a user. Complete mode when forced or when the
    /// user has no clusters yet; incremental otherwise.
    #[instrument(skip(self), fields(user_id = %user_id, force_complete))]
    pub async fn perform_clustering(
        &self,
        user_id: &str,
        force_complete: bool,
    ) -> Result<ClusteringOutcome> {
        let existing = self.graph.get_clusters(user_id).await?;
        let complete = force_complete || existing.is_empty();

        let mut outcome = if complete {
            self.run_complete(user_id).await?
        } else {
            self.run_incremental(user_id).await?
        };

        self.name_pending_clusters(user_id).await?;
        outcome.mode = Some(if complete {
            ClusteringMode::Complete
        } else {
            ClusteringMode::Incremental
        });
        Ok(outcome)
    }

    async fn run_complete(&self, user_id: &str) -> Result<ClusteringOutcome> {
        info!("Complete clustering: clearing assignments and clusters");
        self.graph.clear_cluster_assignments(user_id).await?;
        self.graph.delete_clusters(user_id).await?;

        let statements = self.graph.valid_statements(user_id).await?;
        self.cluster_pass(user_id, &statements).await
    }

    async fn run_incremental(&self, user_id: &str) -> Result<ClusteringOutcome> {
        let unclustered = self.graph.unclustered_valid_statements(user_id).await?;
        let mut outcome = if unclustered.is_empty() {
            debug!("No unclustered statements; skipping assignment pass");
            ClusteringOutcome::default()
        } else {
            let statements = self.graph.valid_statements(user_id).await?;
            self.cluster_pass(user_id, &statements).await?
        };

        // Drift: detect from the explicit state, evolve what drifted
        let drifted = self.detect_drift(user_id).await?;
        for cluster in drifted {
            outcome.drifted.push(cluster.uuid);
            match self.evolve_cluster(user_id, &cluster).await {
                Ok(Some(successors)) => {
                    outcome.evolved.push(cluster.uuid);
                    outcome.clusters_created.extend(successors);
                }
                Ok(None) => {}
                Err(e) => {
                    // One bad cluster must not poison the run
                    warn!(cluster = %cluster.uuid, error = %e, "Cluster evolution failed");
                }
            }
        }
        Ok(outcome)
    }

    /// Project the similarity graph, run Leiden, finalise communities.
    /// `statements` is every valid statement of the user; only previously
    /// unclustered members receive assignments.
    async fn cluster_pass(
        &self,
        user_id: &str,
        statements: &[Statement],
    ) -> Result<ClusteringOutcome> {
        let mut outcome = ClusteringOutcome::default();
        if statements.is_empty() {
            return Ok(outcome);
        }

        // Ephemeral SIMILAR_TO projection: merge, read back, cluster, drop
        let pairs = self.graph.valid_statement_entity_pairs(user_id).await?;
        let edges = build_similarity_edges(&pairs);
        self.graph.merge_similarity_edges(user_id, &edges).await?;
        let projected = self.graph.similarity_edges(user_id).await?;

        let node_ids: Vec<Uuid> = statements.iter().map(|s| s.uuid).collect();
        let edge_list: Vec<(Uuid, Uuid, f64)> = projected
            .iter()
            .map(|edge| (edge.source, edge.target, edge.weight))
            .collect();
        let communities = leiden(&node_ids, &edge_list, &self.leiden_params());

        self.graph.drop_similarity_edges(user_id).await?;

        // Group statements by community
        let by_uuid: HashMap<Uuid, &Statement> =
            statements.iter().map(|s| (s.uuid, s)).collect();
        let mut groups: BTreeMap<usize, Vec<&Statement>> = BTreeMap::new();
        for (statement_id, community) in &communities {
            if let Some(statement) = by_uuid.get(statement_id).copied() {
                groups.entry(*community).or_default().push(statement);
            }
        }

        for (_, members) in groups {
            if members.len() < self.config.min_cluster_size {
                continue;
            }
            match self.finalize_group(user_id, &members).await {
                Ok((cluster_id, created, assigned)) => {
                    if created {
                        outcome.clusters_created.push(cluster_id);
                    } else if assigned > 0 {
                        outcome.clusters_updated.push(cluster_id);
                    }
                    outcome.statements_clustered += assigned;
                }
                Err(e) => {
                    warn!(error = %e, "Cluster finalisation failed for one community");
                }
            }
        }

        info!(
            created = outcome.clusters_created.len(),
            updated = outcome.clusters_updated.len(),
            assigned = outcome.statements_clustered,
            "Clustering pass finished"
        );
        Ok(outcome)
    }

    /// Assign one surviving community: reuse the earliest existing cluster
    /// id among members or mint a fresh one. Returns
    /// `(cluster_id, newly_created, statements_assigned)`.
    async fn finalize_group(
        &self,
        user_id: &str,
        members: &[&Statement],
    ) -> Result<(Uuid, bool, usize)> {
        let existing_ids: BTreeSet<Uuid> =
            members.iter().filter_map(|s| s.cluster_id).collect();

        let (cluster_id, created) = if existing_ids.is_empty() {
            (Uuid::new_v4(), true)
        } else {
            (self.earliest_cluster(&existing_ids).await?, false)
        };

        let unassigned: Vec<Uuid> = members
            .iter()
            .filter(|s| s.cluster_id.is_none())
            .map(|s| s.uuid)
            .collect();
        if !unassigned.is_empty() {
            self.graph.assign_cluster(&unassigned, cluster_id).await?;
        }

        if created {
            let cluster = self
                .materialize_cluster(cluster_id, user_id, members, AspectType::Thematic)
                .await?;
            self.graph.save_cluster(&cluster).await?;
        } else if !unassigned.is_empty() {
            self.refresh_cluster_metadata(cluster_id).await?;
        }

        Ok((cluster_id, created, unassigned.len()))
    }

    /// Earliest-created cluster among the candidate ids
    async fn earliest_cluster(&self, candidates: &BTreeSet<Uuid>) -> Result<Uuid> {
        let mut earliest: Option<(chrono::DateTime<Utc>, Uuid)> = None;
        for id in candidates {
            if let Some(cluster) = self.graph.get_cluster(*id).await? {
                let key = (cluster.created_at, cluster.uuid);
                if earliest.is_none_or(|current| key < current) {
                    earliest = Some(key);
                }
            }
        }
        // Candidates came off statements; a missing cluster row means the
        // assignment outlived its cluster; fall back to the smallest id
        #[allow(clippy::expect_used)]
        Ok(earliest
            .map(|(_, id)| id)
            .unwrap_or_else(|| *candidates.iter().next().expect("candidates non-empty")))
    }

    /// Build a Cluster node for a fresh community: size, top-10 entity
    /// frequencies per slot, and the fact-embedding centroid.
    async fn materialize_cluster(
        &self,
        cluster_id: Uuid,
        user_id: &str,
        members: &[&Statement],
        aspect_type: AspectType,
    ) -> Result<Cluster> {
        let terms = self.collect_terms(members).await?;
        let mut cluster = Cluster::unnamed(cluster_id, user_id.to_string(), aspect_type);
        cluster.size = members.len();
        cluster.top_subjects = top_frequencies(&terms.subjects, 10);
        cluster.top_predicates = top_frequencies(&terms.predicates, 10);
        cluster.top_objects = top_frequencies(&terms.objects, 10);

        let embeddings: Vec<&[f32]> = members
            .iter()
            .filter_map(|s| s.fact_embedding.as_deref())
            .collect();
        cluster.embedding_count = embeddings.len();
        cluster.cluster_embedding = centroid(&embeddings);
        Ok(cluster)
    }

    /// Recompute size and centroid after membership changed
    async fn refresh_cluster_metadata(&self, cluster_id: Uuid) -> Result<()> {
        let Some(mut cluster) = self.graph.get_cluster(cluster_id).await? else {
            return Ok(());
        };
        let members = self.graph.cluster_members(cluster_id).await?;
        cluster.size = members.len();
        let embeddings: Vec<&[f32]> = members
            .iter()
            .filter_map(|s| s.fact_embedding.as_deref())
            .collect();
        cluster.embedding_count = embeddings.len();
        cluster.cluster_embedding = centroid(&embeddings);
        cluster.updated_at = Utc::now();
        self.graph.save_cluster(&cluster).await
    }

    /// Entity-name occurrence counts per slot across the member triples
    async fn collect_terms(&self, members: &[&Statement]) -> Result<ClusterTerms> {
        let mut terms = ClusterTerms {
            size: members.len(),
            ..ClusterTerms::default()
        };
        for statement in members {
            let Some(triple) = self.graph.get_triple_for_statement(statement.uuid).await? else {
                continue;
            };
            *terms.subjects.entry(triple.subject.name).or_insert(0) += 1;
            *terms.predicates.entry(triple.predicate.name).or_insert(0) += 1;
            *terms.objects.entry(triple.object.name).or_insert(0) += 1;
        }
        Ok(terms)
    }

    /// Name every cluster still flagged `needs_naming` via TF-IDF terms and
    /// the naming prompt. Per-cluster failures keep the uuid fallback name.
    async fn name_pending_clusters(&self, user_id: &str) -> Result<()> {
        let clusters = self.graph.get_clusters(user_id).await?;
        let pending: Vec<&Cluster> = clusters.iter().filter(|c| c.needs_naming).collect();
        if pending.is_empty() {
            return Ok(());
        }

        // Term stats for every cluster feed the IDF denominator
        let mut stats: HashMap<Uuid, ClusterTerms> = HashMap::new();
        for cluster in &clusters {
            let members = self.graph.cluster_members(cluster.uuid).await?;
            let member_refs: Vec<&Statement> = members.iter().collect();
            stats.insert(cluster.uuid, self.collect_terms(&member_refs).await?);
        }
        let all_stats: Vec<&ClusterTerms> = stats.values().collect();

        for cluster in pending {
            let Some(target) = stats.get(&cluster.uuid) else {
                continue;
            };
            let terms = distinctive_terms(target, &all_stats, 10);
            if let Err(e) = self.name_cluster(cluster, &terms).await {
                warn!(cluster = %cluster.uuid, error = %e, "Cluster naming failed; keeping fallback");
            }
        }
        Ok(())
    }

    async fn name_cluster(&self, cluster: &Cluster, terms: &DistinctiveTerms) -> Result<()> {
        let messages =
            prompts::cluster_naming(&terms.subjects, &terms.predicates, &terms.objects);
        let generation = self.model.generate(&messages, Complexity::High).await?;

        let mut updated = cluster.clone();
        match crate::llm::parse_json_output::<NamingVerdict>(&generation.text) {
            Ok(verdict) => {
                updated.name = verdict.name;
                updated.description = verdict.description;
            }
            Err(e) => {
                debug!(error = %e, "Naming verdict unparseable; using uuid fallback");
                updated.name = cluster.fallback_name();
            }
        }
        updated.needs_naming = false;
        updated.updated_at = Utc::now();
        self.graph.save_cluster(&updated).await
    }

    /// Cohesion per cluster: mean cosine between member fact embeddings and
    /// the centroid. Updates the stored score and returns the drifted set.
    async fn detect_drift(&self, user_id: &str) -> Result<Vec<Cluster>> {
        let clusters = self.graph.get_clusters(user_id).await?;
        let mut drifted = Vec::new();

        for cluster in clusters {
            if cluster.evolved {
                continue; // already replaced by successors
            }
            let Some(cluster_embedding) = &cluster.cluster_embedding else {
                continue;
            };
            let members = self.graph.cluster_members(cluster.uuid).await?;
            let similarities: Vec<f32> = members
                .iter()
                .filter_map(|s| s.fact_embedding.as_ref())
                .map(|embedding| cosine_similarity(embedding, cluster_embedding))
                .collect();
            if similarities.is_empty() {
                continue;
            }
            let cohesion = similarities.iter().sum::<f32>() / similarities.len() as f32;

            let mut updated = cluster.clone();
            updated.cohesion_score = Some(cohesion);
            updated.updated_at = Utc::now();
            self.graph.save_cluster(&updated).await?;

            if cohesion < self.config.cohesion_threshold {
                debug!(cluster = %cluster.uuid, cohesion, "Cluster drifted below cohesion threshold");
                drifted.push(updated);
            }
        }
        Ok(drifted)
    }

    /// Split one drifted cluster: local Leiden over its members, successors
    /// inherit the aspect type, orphans join the largest successor, and the
    /// old cluster is marked evolved with SPLIT_INTO edges. Returns the new
    /// cluster ids, or `None` when the cluster was kept.
    async fn evolve_cluster(&self, user_id: &str, cluster: &Cluster) -> Result<Option<Vec<Uuid>>> {
        if cluster.size < 2 * self.config.min_cluster_size {
            return Ok(None);
        }

        let members = self.graph.cluster_members(cluster.uuid).await?;
        let member_ids: BTreeSet<Uuid> = members.iter().map(|s| s.uuid).collect();

        // Local similarity subgraph restricted to this cluster
        let pairs = self.graph.valid_statement_entity_pairs(user_id).await?;
        let local_pairs = restrict_pairs(&pairs, &member_ids);
        let edges = build_similarity_edges(&local_pairs);
        let node_ids: Vec<Uuid> = member_ids.iter().copied().collect();
        let edge_list: Vec<(Uuid, Uuid, f64)> = edges
            .iter()
            .map(|edge| (edge.source, edge.target, edge.weight))
            .collect();
        let communities = leiden(&node_ids, &edge_list, &self.leiden_params());

        // Sub-communities under the same minimum-size rule
        let mut groups: BTreeMap<usize, Vec<Uuid>> = BTreeMap::new();
        for (statement_id, community) in &communities {
            groups.entry(*community).or_default().push(*statement_id);
        }
        let mut kept: Vec<Vec<Uuid>> = groups
            .into_values()
            .filter(|group| group.len() >= self.config.min_cluster_size)
            .collect();

        if kept.len() <= 1 {
            debug!(cluster = %cluster.uuid, "Split produced one or zero viable children; keeping original");
            return Ok(None);
        }

        // Orphans attach to the largest successor
        kept.sort_by_key(|group| std::cmp::Reverse(group.len()));
        let assigned: BTreeSet<Uuid> = kept.iter().flatten().copied().collect();
        let orphans: Vec<Uuid> = member_ids.difference(&assigned).copied().collect();
        kept[0].extend(orphans);

        let by_uuid: HashMap<Uuid, &Statement> = members.iter().map(|s| (s.uuid, s)).collect();
        let mut successors = Vec::with_capacity(kept.len());
        for group in &kept {
            let group_members: Vec<&Statement> = group
                .iter()
                .filter_map(|id| by_uuid.get(id).copied())
                .collect();
            let new_id = Uuid::new_v4();
            let new_cluster = self
                .materialize_cluster(new_id, user_id, &group_members, cluster.aspect_type)
                .await?;
            self.graph.save_cluster(&new_cluster).await?;
            self.graph.assign_cluster(group, new_id).await?;
            self.graph
                .record_cluster_split(
                    cluster.uuid,
                    new_id,
                    &ClusterSplit {
                        reason: "low_cohesion".to_string(),
                        original_size: cluster.size,
                        new_size: group.len(),
                    },
                )
                .await?;
            successors.push(new_id);
        }

        let mut evolved = cluster.clone();
        evolved.evolved = true;
        evolved.evolved_at = Some(Utc::now());
        evolved.updated_at = Utc::now();
        self.graph.save_cluster(&evolved).await?;

        info!(
            cluster = %cluster.uuid,
            successors = successors.len(),
            "Cluster evolved by split"
        );
        Ok(Some(successors))
    }
}

/// Highest-count terms, count descending then name ascending
fn top_frequencies(counts: &HashMap<String, usize>, top_n: usize) -> Vec<String> {
    let mut entries: Vec<(&String, &usize)> = counts.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    entries
        .into_iter()
        .take(top_n)
        .map(|(name, _)| name.clone())
        .collect()
}
