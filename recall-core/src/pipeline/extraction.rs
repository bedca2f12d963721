//! Extraction payloads and triple assembly.
//!
//! Turns the model's entity and statement payloads into in-memory graph
//! structures: entities keyed by case-insensitive name, predicates
//! deduplicated across the batch, statements carrying their temporal
//! attributes.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::warn;

use crate::graph::StatementTriple;
use crate::types::{Entity, Episode, Statement, StatementAttributes};

/// One statement as emitted by the extraction prompt
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedTriple {
    /// Subject entity name; must match an available entity
    pub source: String,
    /// Predicate name, snake_case
    pub predicate: String,
    /// Object entity name; must match an available entity
    pub target: String,
    /// One-sentence natural-language fact
    pub fact: String,
    #[serde(default)]
    pub attributes: Option<Map<String, Value>>,
}

/// Entities extracted for one episode, with name embeddings attached
#[derive(Debug, Default)]
pub struct ExtractedEntities {
    /// Case-insensitive name → entity
    by_name: HashMap<String, Entity>,
    /// Names in extraction order, for the statement prompt
    pub names: Vec<String>,
}

impl ExtractedEntities {
    /// Build untyped entities from extracted names, pairing each with its
    /// embedding (same order as `names`).
    #[must_use]
    pub fn build(names: Vec<String>, embeddings: Vec<Vec<f32>>, user_id: &str) -> Self {
        let mut by_name = HashMap::new();
        let mut ordered = Vec::new();
        for (name, embedding) in names.into_iter().zip(embeddings.into_iter()) {
            let key = name.to_lowercase();
            if by_name.contains_key(&key) {
                continue;
            }
            let mut entity = Entity::new(name.clone(), user_id.to_string());
            entity.name_embedding = Some(embedding);
            by_name.insert(key, entity);
            ordered.push(name);
        }
        Self {
            by_name,
            names: ordered,
        }
    }

    /// Case-insensitive lookup
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Entity> {
        self.by_name.get(&name.to_lowercase())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Inputs to triple assembly that were batch-embedded up front
#[derive(Debug)]
pub struct TripleEmbeddings {
    /// One per distinct predicate, aligned with `predicate_order`
    pub predicate_embeddings: Vec<Vec<f32>>,
    /// Embedding of the literal `"Predicate"` type token
    pub type_embedding: Vec<f32>,
    /// One per surviving extracted triple, in order
    pub fact_embeddings: Vec<Vec<f32>>,
}

/// Distinct predicate names across a batch, first-seen casing preserved
#[must_use]
pub fn distinct_predicates(triples: &[ExtractedTriple]) -> Vec<String> {
    let mut seen: HashMap<String, ()> = HashMap::new();
    let mut ordered = Vec::new();
    for triple in triples {
        let key = triple.predicate.to_lowercase();
        if seen.insert(key, ()).is_none() {
            ordered.push(triple.predicate.clone());
        }
    }
    ordered
}

/// Drop triples whose endpoints don't resolve or that loop on themselves
#[must_use]
pub fn filter_extracted(
    triples: Vec<ExtractedTriple>,
    entities: &ExtractedEntities,
) -> Vec<ExtractedTriple> {
    triples
        .into_iter()
        .filter(|triple| {
            if triple.source.eq_ignore_ascii_case(&triple.target) {
                warn!(source = %triple.source, "Rejecting self-loop triple");
                return false;
            }
            let known = entities.get(&triple.source).is_some() && entities.get(&triple.target).is_some();
            if !known {
                warn!(
                    source = %triple.source,
                    target = %triple.target,
                    "Rejecting triple with unknown endpoint"
                );
            }
            known
        })
        .collect()
}

/// Assemble in-memory statement triples from the filtered extraction.
///
/// The statement's `valid_at` copies the episode's unless
/// `attributes.event_date` parses to an instant.
#[must_use]
pub fn assemble_triples(
    extracted: Vec<ExtractedTriple>,
    entities: &ExtractedEntities,
    predicate_order: &[String],
    embeddings: &TripleEmbeddings,
    episode: &Episode,
) -> Vec<StatementTriple> {
    // Distinct predicate name → predicate entity with embeddings
    let mut predicates: HashMap<String, Entity> = HashMap::new();
    for (name, embedding) in predicate_order.iter().zip(&embeddings.predicate_embeddings) {
        let mut entity = Entity::predicate(name.clone(), episode.user_id.clone());
        entity.name_embedding = Some(embedding.clone());
        entity.type_embedding = Some(embeddings.type_embedding.clone());
        entity.space_id = episode.space_id;
        predicates.insert(name.to_lowercase(), entity);
    }

    extracted
        .into_iter()
        .zip(&embeddings.fact_embeddings)
        .filter_map(|(triple, fact_embedding)| {
            let subject = entities.get(&triple.source)?.clone();
            let object = entities.get(&triple.target)?.clone();
            let predicate = predicates.get(&triple.predicate.to_lowercase())?.clone();

            let attributes: StatementAttributes =
                triple.attributes.map(Into::into).unwrap_or_default();
            let valid_at: DateTime<Utc> =
                attributes.event_date().unwrap_or(episode.valid_at);

            let mut statement =
                Statement::new(triple.fact, valid_at, episode.user_id.clone());
            statement.fact_embedding = Some(fact_embedding.clone());
            statement.attributes = attributes;
            statement.space_id = episode.space_id;
            if let Some(space) = episode.space_id {
                statement.space_ids.push(space);
            }

            Some(StatementTriple {
                statement,
                subject,
                predicate,
                object,
            })
        })
        .collect()
}
