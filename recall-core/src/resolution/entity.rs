//! # Entity Resolver
//!
//! Deduplicates freshly extracted entities against the stored graph:
//! similarity candidates plus an LLM identity verdict for regular entities,
//! exact case-insensitive name matching for predicates. Predicates are
//! universal: an identical name is always the same predicate.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::constants::{ENTITY_CANDIDATE_LIMIT, ENTITY_SIMILARITY_THRESHOLD};
use crate::error::Result;
use crate::graph::{GraphStore, SimilarEntityQuery, StatementTriple};
use crate::llm::{prompts, Complexity, LanguageModel};
use crate::metrics::PipelineMetrics;
use crate::types::Entity;
use serde::Deserialize;

/// LLM verdict for one extracted entity
#[derive(Debug, Deserialize)]
struct DedupVerdict {
    id: usize,
    #[allow(dead_code)]
    name: String,
    /// Candidate index, or -1 for "new entity"
    duplicate_idx: i64,
}

/// Resolves in-memory triples against stored entities
pub struct EntityResolver {
    graph: Arc<dyn GraphStore>,
    model: Arc<dyn LanguageModel>,
}

impl EntityResolver {
    pub fn new(graph: Arc<dyn GraphStore>, model: Arc<dyn LanguageModel>) -> Self {
        Self { graph, model }
    }

    /// Rewrite every triple, substituting stored entities for duplicates.
    ///
    /// An unparseable LLM verdict keeps the original triples unchanged.
    #[instrument(skip_all, fields(user_id = %user_id, triples = triples.len()))]
    pub async fn resolve(
        &self,
        triples: Vec<StatementTriple>,
        user_id: &str,
        metrics: &mut PipelineMetrics,
    ) -> Result<Vec<StatementTriple>> {
        if triples.is_empty() {
            return Ok(triples);
        }

        // uuid → resolved stored entity
        let mut resolved: HashMap<Uuid, Entity> = HashMap::new();

        self.resolve_predicates(&triples, user_id, &mut resolved)
            .await?;
        self.resolve_regular_entities(&triples, user_id, &mut resolved, metrics)
            .await?;

        if resolved.is_empty() {
            return Ok(triples);
        }

        debug!(resolved = resolved.len(), "Substituting resolved entities");
        Ok(triples
            .into_iter()
            .map(|mut triple| {
                if let Some(entity) = resolved.get(&triple.subject.uuid) {
                    triple.subject = entity.clone();
                }
                if let Some(entity) = resolved.get(&triple.predicate.uuid) {
                    triple.predicate = entity.clone();
                }
                if let Some(entity) = resolved.get(&triple.object.uuid) {
                    triple.object = entity.clone();
                }
                triple
            })
            .collect())
    }

    /// Exact case-insensitive matching; no LLM involved
    async fn resolve_predicates(
        &self,
        triples: &[StatementTriple],
        user_id: &str,
        resolved: &mut HashMap<Uuid, Entity>,
    ) -> Result<()> {
        // One lookup per distinct predicate name
        let mut by_name: HashMap<String, Vec<Uuid>> = HashMap::new();
        for triple in triples {
            by_name
                .entry(triple.predicate.name.to_lowercase())
                .or_default()
                .push(triple.predicate.uuid);
        }

        for (name, uuids) in by_name {
            let matches = self
                .graph
                .find_exact_predicate_matches(&name, user_id)
                .await?;
            if let Some(stored) = matches.into_iter().next() {
                for uuid in uuids {
                    resolved.insert(uuid, stored.clone());
                }
            }
        }
        Ok(())
    }

    /// Similarity candidates plus LLM identity judgement
    async fn resolve_regular_entities(
        &self,
        triples: &[StatementTriple],
        user_id: &str,
        resolved: &mut HashMap<Uuid, Entity>,
        metrics: &mut PipelineMetrics,
    ) -> Result<()> {
        // Unique subjects/objects by uuid (extraction already deduplicated
        // by name, so uuid identity is name identity here)
        let mut unique: Vec<&Entity> = Vec::new();
        let mut seen: HashMap<Uuid, ()> = HashMap::new();
        for triple in triples {
            for entity in [&triple.subject, &triple.object] {
                if seen.insert(entity.uuid, ()).is_none() {
                    unique.push(entity);
                }
            }
        }

        // Candidate search per entity
        let mut candidate_lists: Vec<Vec<Entity>> = Vec::with_capacity(unique.len());
        for entity in &unique {
            let Some(embedding) = &entity.name_embedding else {
                candidate_lists.push(Vec::new());
                continue;
            };
            let scored = self
                .graph
                .find_similar_entities(&SimilarEntityQuery {
                    embedding: embedding.clone(),
                    limit: ENTITY_CANDIDATE_LIMIT,
                    threshold: ENTITY_SIMILARITY_THRESHOLD,
                    user_id: user_id.to_string(),
                    entity_type: entity.entity_type.clone(),
                })
                .await?;
            candidate_lists.push(scored.into_iter().map(|s| s.entity).collect());
        }

        if candidate_lists.iter().all(Vec::is_empty) {
            return Ok(());
        }

        let prompt_entries: Vec<prompts::DedupCandidateList> = unique
            .iter()
            .zip(candidate_lists.iter())
            .enumerate()
            .map(|(id, (entity, candidates))| prompts::DedupCandidateList {
                id,
                name: entity.name.clone(),
                candidates: candidates.iter().map(|c| c.name.clone()).collect(),
            })
            .collect();

        let messages = prompts::entity_dedup(&prompt_entries);
        let generation = self.model.generate(&messages, Complexity::Low).await?;
        metrics.record_generation(Complexity::Low, &generation);

        let verdicts: Vec<DedupVerdict> = match crate::llm::parse_json_output(&generation.text) {
            Ok(verdicts) => verdicts,
            Err(e) => {
                // Conservative: treat everything as new rather than guess
                warn!(error = %e, "Entity dedup verdict unparseable; keeping extracted entities");
                return Ok(());
            }
        };

        for verdict in verdicts {
            if verdict.duplicate_idx < 0 {
                continue;
            }
            let Some(entity) = unique.get(verdict.id) else {
                warn!(id = verdict.id, "Dedup verdict references unknown entity index");
                continue;
            };
            let Some(candidate) = candidate_lists
                .get(verdict.id)
                .and_then(|candidates| candidates.get(verdict.duplicate_idx as usize))
            else {
                warn!(
                    id = verdict.id,
                    idx = verdict.duplicate_idx,
                    "Dedup verdict references unknown candidate index"
                );
                continue;
            };
            resolved.insert(entity.uuid, candidate.clone());
        }
        Ok(())
    }
}
