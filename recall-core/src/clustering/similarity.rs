//! Statement similarity graph construction.
//!
//! Two valid statements are similar when they share at least one entity
//! through their HAS_SUBJECT/HAS_PREDICATE/HAS_OBJECT edges. The edge weight
//! is twice the shared-entity count; the shared entity uuids ride along for
//! inspection.

use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::graph::SimilarityEdge;

/// Build SIMILAR_TO edges from `(statement, entity)` incidence pairs.
///
/// Output is sorted by `(source, target)` and each unordered statement pair
/// appears once with `source < target`.
#[must_use]
pub fn build_similarity_edges(pairs: &[(Uuid, Uuid)]) -> Vec<SimilarityEdge> {
    // entity → statements touching it
    let mut by_entity: BTreeMap<Uuid, BTreeSet<Uuid>> = BTreeMap::new();
    for (statement, entity) in pairs {
        by_entity.entry(*entity).or_default().insert(*statement);
    }

    // unordered statement pair → shared entities
    let mut shared: BTreeMap<(Uuid, Uuid), BTreeSet<Uuid>> = BTreeMap::new();
    for (entity, statements) in &by_entity {
        let statements: Vec<Uuid> = statements.iter().copied().collect();
        for i in 0..statements.len() {
            for j in (i + 1)..statements.len() {
                shared
                    .entry((statements[i], statements[j]))
                    .or_default()
                    .insert(*entity);
            }
        }
    }

    shared
        .into_iter()
        .map(|((source, target), entities)| SimilarityEdge {
            source,
            target,
            weight: entities.len() as f64 * 2.0,
            shared_entities: entities.into_iter().collect(),
        })
        .collect()
}

/// Restrict incidence pairs to a statement subset (cluster-local subgraphs)
#[must_use]
pub fn restrict_pairs(
    pairs: &[(Uuid, Uuid)],
    statements: &BTreeSet<Uuid>,
) -> Vec<(Uuid, Uuid)> {
    pairs
        .iter()
        .filter(|(statement, _)| statements.contains(statement))
        .copied()
        .collect()
}
