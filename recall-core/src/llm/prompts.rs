//! Prompt builders.
//!
//! Each builder produces a message sequence whose *contract* (inputs, output
//! shape inside the `<output>` envelope) is fixed; the wording is not part of
//! the contract and may change freely.

use chrono::{DateTime, Utc};

use super::provider::Message;
use crate::constants::NOTHING_TO_REMEMBER;
use crate::types::EpisodeType;

/// Inputs to the normalization stage prompt
#[derive(Debug, Clone)]
pub struct NormalizationInput<'a> {
    pub body: &'a str,
    pub source: &'a str,
    pub episode_type: EpisodeType,
    pub reference_time: DateTime<Utc>,
    /// Labelled markdown fragment of related episodes/statements
    pub related_memories: Option<&'a str>,
    /// Active ingestion rules for this source
    pub rules: &'a [String],
    /// Serialized previous episodes of the same session
    pub session_context: Option<&'a str>,
}

/// Build the normalization prompt.
///
/// Output contract: `<output>` contains the normalized text, or the
/// `NOTHING_TO_REMEMBER` sentinel when the input holds no durable knowledge.
#[must_use]
pub fn normalization(input: &NormalizationInput<'_>) -> Vec<Message> {
    let task = match input.episode_type {
        EpisodeType::Document => {
            "You normalize a document chunk into a self-contained passage of \
             durable knowledge. Resolve pronouns and relative references using \
             the surrounding context. Preserve every concrete fact; drop \
             boilerplate, navigation, and formatting noise."
        }
        EpisodeType::Conversation => {
            "You normalize a message into a self-contained passage of durable \
             knowledge about the user and their world. Resolve pronouns and \
             relative dates. Drop greetings, fillers, and anything with no \
             lasting value."
        }
    };

    let mut context = String::new();
    context.push_str(&format!("Source: {}\n", input.source));
    context.push_str(&format!(
        "Episode timestamp: {}\n",
        input.reference_time.to_rfc3339()
    ));
    if !input.rules.is_empty() {
        context.push_str("\nIngestion rules for this source:\n");
        for rule in input.rules {
            context.push_str(&format!("- {rule}\n"));
        }
    }
    if let Some(session) = input.session_context {
        context.push_str(&format!("\nSession context:\n{session}\n"));
    }
    if let Some(memories) = input.related_memories {
        context.push_str(&format!("\nRelated memories:\n{memories}\n"));
    }

    vec![
        Message::system(format!(
            "{task}\n\nRespond with the normalized text inside <output></output> \
             tags. If nothing is worth remembering respond with \
             <output>{NOTHING_TO_REMEMBER}</output>."
        )),
        Message::user(format!("{context}\nEpisode:\n{}", input.body)),
    ]
}

/// Build the entity extraction prompt.
///
/// Output contract: `<output>` contains a JSON array of entity name strings.
#[must_use]
pub fn entity_extraction(episode_content: &str, previous_episodes: &[String]) -> Vec<Message> {
    let mut context = String::new();
    if !previous_episodes.is_empty() {
        context.push_str("Previous episodes (context only, do not extract from these):\n");
        for episode in previous_episodes {
            context.push_str(&format!("- {episode}\n"));
        }
        context.push('\n');
    }

    vec![
        Message::system(
            "Extract the entities mentioned in the episode: people, places, \
             organizations, products, concepts. Use the surrounding context only \
             to resolve references. Respond with a JSON array of entity name \
             strings inside <output></output> tags, e.g. \
             <output>[\"John\", \"New York\"]</output>. No duplicates.",
        ),
        Message::user(format!("{context}Episode:\n{episode_content}")),
    ]
}

/// Build the statement extraction prompt.
///
/// Output contract: `<output>` contains a JSON array of
/// `{source, predicate, target, fact, attributes?}` objects where `source`
/// and `target` are names from the available entity list.
#[must_use]
pub fn statement_extraction(
    episode_content: &str,
    previous_episodes: &[String],
    primary_entities: &[String],
    expanded_entities: &[String],
    valid_at: DateTime<Utc>,
) -> Vec<Message> {
    let mut context = String::new();
    if !previous_episodes.is_empty() {
        context.push_str("Previous episodes (context only):\n");
        for episode in previous_episodes {
            context.push_str(&format!("- {episode}\n"));
        }
        context.push('\n');
    }
    context.push_str(&format!(
        "Available entities (primary): {}\n",
        serde_json::to_string(primary_entities).unwrap_or_default()
    ));
    if !expanded_entities.is_empty() {
        context.push_str(&format!(
            "Available entities (expanded): {}\n",
            serde_json::to_string(expanded_entities).unwrap_or_default()
        ));
    }
    context.push_str(&format!("Episode time: {}\n", valid_at.to_rfc3339()));

    vec![
        Message::system(
            "Extract factual statements from the episode as subject-predicate-object \
             triples. `source` and `target` MUST exactly match one of the available \
             entity names. `predicate` is a short snake_case relation. `fact` is one \
             natural-language sentence stating the fact. Optional `attributes` may \
             carry `event_date` (ISO-8601 instant), `duration`, `temporal_context`, \
             and `confidence` (0-1). Respond with a JSON array inside \
             <output></output> tags.",
        ),
        Message::user(format!("{context}\nEpisode:\n{episode_content}")),
    ]
}

/// One extracted entity with its stored candidates, indexed for the verdict
#[derive(Debug, Clone)]
pub struct DedupCandidateList {
    /// Stable per-entity index referenced by the verdict `id`
    pub id: usize,
    pub name: String,
    /// Candidate names in presentation order; `duplicate_idx` indexes this
    pub candidates: Vec<String>,
}

/// Build the entity deduplication prompt.
///
/// Output contract: `<output>` contains a JSON array of
/// `{id, name, duplicate_idx}` where `duplicate_idx >= 0` selects a candidate
/// and `-1` means the entity is new.
#[must_use]
pub fn entity_dedup(entities: &[DedupCandidateList]) -> Vec<Message> {
    let mut listing = String::new();
    for entry in entities {
        listing.push_str(&format!("Entity {}: \"{}\"\n", entry.id, entry.name));
        if entry.candidates.is_empty() {
            listing.push_str("  (no stored candidates)\n");
        } else {
            for (idx, candidate) in entry.candidates.iter().enumerate() {
                listing.push_str(&format!("  candidate {idx}: \"{candidate}\"\n"));
            }
        }
    }

    vec![
        Message::system(
            "Decide for each extracted entity whether it is the same real-world \
             thing as one of its stored candidates. Respond with a JSON array of \
             {\"id\": <entity id>, \"name\": <entity name>, \"duplicate_idx\": <candidate \
             index or -1>} inside <output></output> tags. Use -1 when the entity \
             is new. Judge by identity, not surface similarity.",
        ),
        Message::user(listing),
    ]
}

/// A hydrated candidate statement shown to the resolution prompt
#[derive(Debug, Clone)]
pub struct ResolutionCandidate {
    pub uuid: String,
    pub fact: String,
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

/// A new statement awaiting a resolution verdict
#[derive(Debug, Clone)]
pub struct ResolutionSubject {
    pub uuid: String,
    pub fact: String,
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

/// Build the statement resolution prompt.
///
/// Output contract: `<output>` contains a JSON array of
/// `{statementId, isDuplicate, duplicateId?, contradictions: [uuid…]}`.
#[must_use]
pub fn statement_resolution(
    new_statements: &[ResolutionSubject],
    candidates: &[ResolutionCandidate],
) -> Vec<Message> {
    let mut listing = String::from("New statements:\n");
    for statement in new_statements {
        listing.push_str(&format!(
            "- {} | ({}, {}, {}) | {}\n",
            statement.uuid, statement.subject, statement.predicate, statement.object,
            statement.fact
        ));
    }
    listing.push_str("\nExisting statements:\n");
    for candidate in candidates {
        listing.push_str(&format!(
            "- {} | ({}, {}, {}) | {}\n",
            candidate.uuid, candidate.subject, candidate.predicate, candidate.object,
            candidate.fact
        ));
    }

    vec![
        Message::system(
            "Compare each new statement against the existing ones and classify:\n\
             1. Duplicate: same meaning as an existing statement.\n\
             2. Contradiction or superseding evolution: mutually exclusive facts, \
             or a state replacement (job change, location change, tech stack \
             change): list the superseded existing statement uuids.\n\
             3. Progression, temporal sequence, or learning: both may be true and \
             neither duplicate nor contradiction.\n\
             Respond with a JSON array of {\"statementId\": <new uuid>, \
             \"isDuplicate\": <bool>, \"duplicateId\": <existing uuid or null>, \
             \"contradictions\": [<existing uuids>]} inside <output></output> tags, \
             one element per new statement.",
        ),
        Message::user(listing),
    ]
}

/// Build the cluster naming prompt from TF-IDF-distinctive terms.
///
/// Output contract: `<output>` contains a JSON object
/// `{"name": string, "description": string}`.
#[must_use]
pub fn cluster_naming(
    top_subjects: &[String],
    top_predicates: &[String],
    top_objects: &[String],
) -> Vec<Message> {
    vec![
        Message::system(
            "Name a cluster of related facts. Given its most distinctive \
             subjects, predicates, and objects, produce a short human-readable \
             name (2-4 words) and a one-sentence description. Respond with a \
             JSON object {\"name\": ..., \"description\": ...} inside \
             <output></output> tags.",
        ),
        Message::user(format!(
            "Distinctive subjects: {}\nDistinctive predicates: {}\nDistinctive objects: {}",
            top_subjects.join(", "),
            top_predicates.join(", "),
            top_objects.join(", ")
        )),
    ]
}

/// Build the space assignment prompt.
///
/// Output contract: `<output>` contains a JSON array of statement uuid
/// strings that belong to the space.
#[must_use]
pub fn space_assignment(
    space_name: &str,
    space_description: &str,
    statements: &[(String, String)],
) -> Vec<Message> {
    let mut listing = String::new();
    for (uuid, fact) in statements {
        listing.push_str(&format!("- {uuid} | {fact}\n"));
    }

    vec![
        Message::system(
            "Decide which of the listed facts belong to the given topic space. \
             Only include facts clearly on-topic. Respond with a JSON array of \
             the matching statement uuids inside <output></output> tags.",
        ),
        Message::user(format!(
            "Space: {space_name}\nDescription: {space_description}\n\nFacts:\n{listing}"
        )),
    ]
}
