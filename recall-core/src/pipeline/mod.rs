//! # Ingestion Pipeline
//!
//! The seven-step transform from one episode to graph mutations:
//! context retrieval → normalization → episode creation → entity extraction
//! → statement extraction → entity resolution → statement resolution →
//! persistence. Runs inside a per-user worker, so everything here may assume
//! no concurrent writes for the same user.

pub mod extraction;
pub mod processor;
pub mod related;

pub use processor::IngestProcessor;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::constants::DEFAULT_EPISODE_WINDOW;
use crate::embeddings::EmbeddingProvider;
use crate::error::Result;
use crate::graph::{GraphStore, RecentEpisodesQuery};
use crate::llm::{prompts, Complexity, LanguageModel};
use crate::metrics::PipelineMetrics;
use crate::resolution::{EntityResolver, StatementResolver};
use crate::types::{Episode, IngestRequest};

use extraction::{ExtractedEntities, ExtractedTriple, TripleEmbeddings};

/// Result of one pipeline run, serialized into the queue entry output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    /// Persisted episode, absent on the nothing-to-remember short circuit
    pub episode_uuid: Option<Uuid>,
    pub statements_created: usize,
    pub statements_invalidated: usize,
    pub duplicates_found: usize,
    /// Uuids of the statements now backing this episode's facts: newly
    /// created ones plus the existing statements duplicates resolved to
    pub statement_uuids: Vec<Uuid>,
    pub metrics: PipelineMetrics,
}

impl IngestOutcome {
    fn empty(metrics: PipelineMetrics) -> Self {
        Self {
            episode_uuid: None,
            statements_created: 0,
            statements_invalidated: 0,
            duplicates_found: 0,
            statement_uuids: Vec::new(),
            metrics,
        }
    }
}

/// Per-source normalization rules, applied verbatim into the prompt
pub type IngestionRules = HashMap<String, Vec<String>>;

/// Orchestrates one episode's journey into the graph
pub struct IngestionPipeline {
    graph: Arc<dyn GraphStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    model: Arc<dyn LanguageModel>,
    entity_resolver: EntityResolver,
    statement_resolver: StatementResolver,
    rules: IngestionRules,
}

impl IngestionPipeline {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        let entity_resolver = EntityResolver::new(Arc::clone(&graph), Arc::clone(&model));
        let statement_resolver = StatementResolver::new(Arc::clone(&graph), Arc::clone(&model));
        Self {
            graph,
            embeddings,
            model,
            entity_resolver,
            statement_resolver,
            rules: IngestionRules::new(),
        }
    }

    /// Attach per-source ingestion rules
    #[must_use]
    pub fn with_rules(mut self, rules: IngestionRules) -> Self {
        self.rules = rules;
        self
    }

    /// Run the full pipeline for one episode
    #[instrument(skip_all, fields(user_id = %user_id, source = %request.source))]
    pub async fn run(&self, user_id: &str, request: &IngestRequest) -> Result<IngestOutcome> {
        let mut metrics = PipelineMetrics::new();

        // 1. Context retrieval, concurrent with related-memory retrieval
        let timer = metrics.start_step("context");
        let recent_episodes_query = RecentEpisodesQuery {
            user_id: user_id.to_string(),
            source: Some(request.source.clone()),
            session_id: request.session_id.clone(),
            before: request.reference_time,
            limit: DEFAULT_EPISODE_WINDOW,
        };
        let (previous_episodes, related) = tokio::try_join!(
            self.graph.get_recent_episodes(&recent_episodes_query),
            related::retrieve(&self.graph, &self.embeddings, &request.episode_body, user_id),
        )?;
        let session_context = request
            .session_id
            .as_ref()
            .filter(|_| !previous_episodes.is_empty())
            .map(|_| serialize_session(&previous_episodes));
        metrics.record_step(timer);

        // 2. Normalization
        let timer = metrics.start_step("normalization");
        let rules = self
            .rules
            .get(&request.source)
            .cloned()
            .unwrap_or_default();
        let messages = prompts::normalization(&prompts::NormalizationInput {
            body: &request.episode_body,
            source: &request.source,
            episode_type: request.effective_type(),
            reference_time: request.reference_time,
            related_memories: related.markdown.as_deref(),
            rules: &rules,
            session_context: session_context.as_deref(),
        });
        let generation = self.model.generate(&messages, Complexity::High).await?;
        metrics.record_generation(Complexity::High, &generation);
        metrics.record_step(timer);

        if crate::llm::is_nothing_to_remember(&generation.text) {
            info!("Normalization found nothing to remember; skipping episode");
            return Ok(IngestOutcome::empty(metrics));
        }
        let Some(content) = crate::llm::extract_output_or_raw(&generation.text) else {
            info!("Normalization returned empty content; skipping episode");
            return Ok(IngestOutcome::empty(metrics));
        };

        // 3. Episode creation (in memory; persisted in step 8)
        let timer = metrics.start_step("episode");
        let mut episode = Episode::new(
            content,
            request.episode_body.clone(),
            request.source.clone(),
            request.reference_time,
            user_id.to_string(),
            request.effective_type(),
        );
        episode.metadata = request.metadata.clone();
        episode.session_id = request.session_id.clone();
        episode.space_id = request.space_id;
        episode.content_embedding = Some(self.embeddings.embed_text(&episode.content).await?);
        metrics.record_step(timer);

        // 4. Entity extraction
        let timer = metrics.start_step("entity_extraction");
        let previous_contents: Vec<String> = previous_episodes
            .iter()
            .map(|e| e.content.clone())
            .collect();
        let entities = self
            .extract_entities(&episode, &previous_contents, &mut metrics)
            .await?;
        metrics.record_step(timer);

        if entities.is_empty() {
            debug!("No entities extracted; persisting episode without statements");
            self.graph.save_episode(&episode).await?;
            let mut outcome = IngestOutcome::empty(metrics);
            outcome.episode_uuid = Some(episode.uuid);
            return Ok(outcome);
        }

        // 5. Statement extraction
        let timer = metrics.start_step("statement_extraction");
        let triples = self
            .extract_statements(&episode, &previous_contents, &entities, &mut metrics)
            .await?;
        metrics.record_step(timer);

        // 6. Entity resolution
        let timer = metrics.start_step("entity_resolution");
        let triples = self
            .entity_resolver
            .resolve(triples, user_id, &mut metrics)
            .await?;
        metrics.record_step(timer);

        // 7. Statement resolution
        let timer = metrics.start_step("statement_resolution");
        let previous_ids: Vec<Uuid> = previous_episodes.iter().map(|e| e.uuid).collect();
        let resolution = self
            .statement_resolver
            .resolve(triples, &previous_ids, user_id, &mut metrics)
            .await?;
        metrics.record_step(timer);

        // 8. Persistence: sequential upserts, then one bulk invalidation
        let timer = metrics.start_step("persistence");
        self.graph.save_episode(&episode).await?;
        let mut statement_uuids = Vec::new();
        for triple in &resolution.to_persist {
            self.graph.save_triple(episode.uuid, triple).await?;
            statement_uuids.push(triple.statement.uuid);
        }
        for duplicate in &resolution.duplicates {
            // The restated fact gains this episode as extra evidence
            self.graph
                .link_provenance(episode.uuid, duplicate.existing_statement)
                .await?;
            statement_uuids.push(duplicate.existing_statement);
        }
        let statements_invalidated = if resolution.invalidate.is_empty() {
            0
        } else {
            self.graph
                .invalidate_statements(&resolution.invalidate, episode.uuid, Utc::now())
                .await?
        };
        metrics.record_step(timer);

        info!(
            episode = %episode.uuid,
            created = resolution.to_persist.len(),
            invalidated = statements_invalidated,
            duplicates = resolution.duplicates.len(),
            "Episode ingested"
        );

        Ok(IngestOutcome {
            episode_uuid: Some(episode.uuid),
            statements_created: resolution.to_persist.len(),
            statements_invalidated,
            duplicates_found: resolution.duplicates.len(),
            statement_uuids,
            metrics,
        })
    }

    /// Step 4: names from the model, embeddings in one batched call
    async fn extract_entities(
        &self,
        episode: &Episode,
        previous_contents: &[String],
        metrics: &mut PipelineMetrics,
    ) -> Result<ExtractedEntities> {
        let messages = prompts::entity_extraction(&episode.content, previous_contents);
        let generation = self.model.generate(&messages, Complexity::High).await?;
        metrics.record_generation(Complexity::High, &generation);

        let names: Vec<String> = match crate::llm::parse_json_output(&generation.text) {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Entity extraction unparseable; continuing with no entities");
                return Ok(ExtractedEntities::default());
            }
        };
        if names.is_empty() {
            return Ok(ExtractedEntities::default());
        }

        let embeddings = self.embeddings.embed_batch(&names).await?;
        Ok(ExtractedEntities::build(
            names,
            embeddings,
            &episode.user_id,
        ))
    }

    /// Step 5: triples from the model, three embedding batches in parallel
    async fn extract_statements(
        &self,
        episode: &Episode,
        previous_contents: &[String],
        entities: &ExtractedEntities,
        metrics: &mut PipelineMetrics,
    ) -> Result<Vec<crate::graph::StatementTriple>> {
        let messages = prompts::statement_extraction(
            &episode.content,
            previous_contents,
            &entities.names,
            &[], // expanded entities are empty in type-free mode
            episode.valid_at,
        );
        let generation = self.model.generate(&messages, Complexity::High).await?;
        metrics.record_generation(Complexity::High, &generation);

        let extracted: Vec<ExtractedTriple> = match crate::llm::parse_json_output(&generation.text)
        {
            Ok(triples) => triples,
            Err(e) => {
                warn!(error = %e, "Statement extraction unparseable; continuing with no triples");
                return Ok(Vec::new());
            }
        };

        let extracted = extraction::filter_extracted(extracted, entities);
        if extracted.is_empty() {
            return Ok(Vec::new());
        }

        let predicate_names = extraction::distinct_predicates(&extracted);
        let fact_texts: Vec<String> = extracted.iter().map(|t| t.fact.clone()).collect();

        // The only fan-out inside the pipeline: the three embedding batches
        let (predicate_embeddings, type_embedding, fact_embeddings) = tokio::try_join!(
            self.embeddings.embed_batch(&predicate_names),
            self.embeddings
                .embed_text(crate::constants::PREDICATE_TYPE),
            self.embeddings.embed_batch(&fact_texts),
        )?;

        Ok(extraction::assemble_triples(
            extracted,
            entities,
            &predicate_names,
            &TripleEmbeddings {
                predicate_embeddings,
                type_embedding,
                fact_embeddings,
            },
            episode,
        ))
    }
}

/// Serialize the windowed session episodes for the normalization prompt
fn serialize_session(episodes: &[Episode]) -> String {
    episodes
        .iter()
        .map(|episode| {
            format!(
                "[{}] {}",
                episode.valid_at.format("%Y-%m-%dT%H:%M:%SZ"),
                episode.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
