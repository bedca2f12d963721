//! # Statement Resolver
//!
//! Collects potential matches for each new triple in three phases:
//! structural (same subject+predicate, same subject+object), semantic
//! (fact-embedding similarity), and provenance (statements of the prior
//! episodes). Then asks the model for a duplicates-and-contradictions
//! verdict. Conservative on parse failure: every new triple is kept.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::constants::STATEMENT_SIMILARITY_THRESHOLD;
use crate::error::Result;
use crate::graph::{GraphStore, SimilarStatementQuery, StatementTriple};
use crate::llm::{prompts, Complexity, LanguageModel};
use crate::metrics::PipelineMetrics;
use serde::Deserialize;

/// A new statement recognised as restating an existing one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateMatch {
    pub new_statement: Uuid,
    pub existing_statement: Uuid,
}

/// Resolver output: what to persist, what was duplicate, what to invalidate
#[derive(Debug, Default)]
pub struct StatementResolution {
    /// Triples that become new statements
    pub to_persist: Vec<StatementTriple>,
    /// New statements dropped in favour of an existing equivalent
    pub duplicates: Vec<DuplicateMatch>,
    /// Existing statements superseded by this episode
    pub invalidate: Vec<Uuid>,
}

/// LLM verdict for one new statement
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolutionVerdict {
    statement_id: Uuid,
    #[serde(default)]
    is_duplicate: bool,
    #[serde(default)]
    duplicate_id: Option<Uuid>,
    #[serde(default)]
    contradictions: Vec<Uuid>,
}

/// Adjudicates new triples against the stored statement graph
pub struct StatementResolver {
    graph: Arc<dyn GraphStore>,
    model: Arc<dyn LanguageModel>,
}

impl StatementResolver {
    pub fn new(graph: Arc<dyn GraphStore>, model: Arc<dyn LanguageModel>) -> Self {
        Self { graph, model }
    }

    /// Resolve the new triples. `previous_episode_ids` are the windowed
    /// context episodes whose statements join the candidate set.
    #[instrument(skip_all, fields(user_id = %user_id, new = new_triples.len()))]
    pub async fn resolve(
        &self,
        new_triples: Vec<StatementTriple>,
        previous_episode_ids: &[Uuid],
        user_id: &str,
        metrics: &mut PipelineMetrics,
    ) -> Result<StatementResolution> {
        if new_triples.is_empty() {
            return Ok(StatementResolution::default());
        }

        let candidates = self
            .collect_candidates(&new_triples, previous_episode_ids, user_id)
            .await?;

        if candidates.is_empty() {
            debug!("No potential matches; adding all new triples verbatim");
            return Ok(StatementResolution {
                to_persist: new_triples,
                ..StatementResolution::default()
            });
        }

        self.adjudicate(new_triples, &candidates, metrics).await
    }

    /// Three-phase candidate collection, deduplicated by statement uuid
    async fn collect_candidates(
        &self,
        new_triples: &[StatementTriple],
        previous_episode_ids: &[Uuid],
        user_id: &str,
    ) -> Result<Vec<StatementTriple>> {
        let new_ids: HashSet<Uuid> = new_triples.iter().map(|t| t.statement.uuid).collect();
        let mut collected: Vec<Uuid> = Vec::new();
        let mut seen: HashSet<Uuid> = new_ids.clone();

        for triple in new_triples {
            // Phase 1a: direct contradiction shape, same subject and same
            // predicate ("John lives_in NY" vs "John lives_in SF")
            let direct = self
                .graph
                .find_contradictory_statements(
                    triple.subject.uuid,
                    triple.predicate.uuid,
                    user_id,
                )
                .await?;
            for statement in direct {
                if seen.insert(statement.uuid) {
                    collected.push(statement.uuid);
                }
            }

            // Phase 1b: dimensional contradiction shape, same subject and
            // object under a different predicate ("married_to" vs
            // "divorced_from")
            let dimensional = self
                .graph
                .find_statements_with_same_subject_object(
                    triple.subject.uuid,
                    triple.object.uuid,
                    Some(triple.predicate.uuid),
                    user_id,
                )
                .await?;
            for statement in dimensional {
                if seen.insert(statement.uuid) {
                    collected.push(statement.uuid);
                }
            }

            // Phase 2: semantic similarity over fact embeddings
            if let Some(embedding) = &triple.statement.fact_embedding {
                let similar = self
                    .graph
                    .find_similar_statements(&SimilarStatementQuery {
                        embedding: embedding.clone(),
                        threshold: STATEMENT_SIMILARITY_THRESHOLD,
                        limit: 20,
                        user_id: user_id.to_string(),
                        exclude: seen.iter().copied().collect(),
                    })
                    .await?;
                for scored in similar {
                    if seen.insert(scored.statement.uuid) {
                        collected.push(scored.statement.uuid);
                    }
                }
            }
        }

        // Phase 3: statements of the windowed previous episodes
        let episode_statements = futures::future::try_join_all(
            previous_episode_ids
                .iter()
                .map(|id| self.graph.get_episode_statements(*id)),
        )
        .await?;
        for statement in episode_statements.into_iter().flatten() {
            if statement.is_valid() && seen.insert(statement.uuid) {
                collected.push(statement.uuid);
            }
        }

        // Hydrate with entity endpoints for the prompt
        let mut hydrated = Vec::with_capacity(collected.len());
        for statement_id in collected {
            if let Some(triple) = self.graph.get_triple_for_statement(statement_id).await? {
                hydrated.push(triple);
            }
        }
        Ok(hydrated)
    }

    /// Ask the model to classify each new statement; apply the verdicts
    async fn adjudicate(
        &self,
        new_triples: Vec<StatementTriple>,
        candidates: &[StatementTriple],
        metrics: &mut PipelineMetrics,
    ) -> Result<StatementResolution> {
        let subjects: Vec<prompts::ResolutionSubject> = new_triples
            .iter()
            .map(|t| prompts::ResolutionSubject {
                uuid: t.statement.uuid.to_string(),
                fact: t.statement.fact.clone(),
                subject: t.subject.name.clone(),
                predicate: t.predicate.name.clone(),
                object: t.object.name.clone(),
            })
            .collect();
        let candidate_rows: Vec<prompts::ResolutionCandidate> = candidates
            .iter()
            .map(|t| prompts::ResolutionCandidate {
                uuid: t.statement.uuid.to_string(),
                fact: t.statement.fact.clone(),
                subject: t.subject.name.clone(),
                predicate: t.predicate.name.clone(),
                object: t.object.name.clone(),
            })
            .collect();

        let messages = prompts::statement_resolution(&subjects, &candidate_rows);
        let generation = self.model.generate(&messages, Complexity::Low).await?;
        metrics.record_generation(Complexity::Low, &generation);

        let verdicts: Vec<ResolutionVerdict> = match crate::llm::parse_json_output(&generation.text)
        {
            Ok(verdicts) => verdicts,
            Err(e) => {
                // Conservative: keep every new triple, invalidate nothing
                warn!(error = %e, "Statement resolution verdict unparseable; adding all triples");
                return Ok(StatementResolution {
                    to_persist: new_triples,
                    ..StatementResolution::default()
                });
            }
        };

        let candidate_ids: HashSet<Uuid> = candidates.iter().map(|t| t.statement.uuid).collect();
        let mut resolution = StatementResolution::default();
        let mut invalidate_seen: HashSet<Uuid> = HashSet::new();

        for triple in new_triples {
            let verdict = verdicts
                .iter()
                .find(|v| v.statement_id == triple.statement.uuid);

            match verdict {
                Some(v) if v.is_duplicate => {
                    // Only accept duplicate ids that were actually offered
                    match v.duplicate_id.filter(|id| candidate_ids.contains(id)) {
                        Some(existing) => {
                            resolution.duplicates.push(DuplicateMatch {
                                new_statement: triple.statement.uuid,
                                existing_statement: existing,
                            });
                        }
                        None => {
                            warn!(
                                statement = %triple.statement.uuid,
                                "Duplicate verdict without a known duplicateId; keeping triple"
                            );
                            resolution.to_persist.push(triple);
                        }
                    }
                }
                Some(v) => {
                    for contradicted in &v.contradictions {
                        if candidate_ids.contains(contradicted)
                            && invalidate_seen.insert(*contradicted)
                        {
                            resolution.invalidate.push(*contradicted);
                        }
                    }
                    resolution.to_persist.push(triple);
                }
                None => resolution.to_persist.push(triple),
            }
        }

        debug!(
            persisted = resolution.to_persist.len(),
            duplicates = resolution.duplicates.len(),
            invalidated = resolution.invalidate.len(),
            "Statement resolution complete"
        );
        Ok(resolution)
    }
}
