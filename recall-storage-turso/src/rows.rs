//! Row → domain struct mapping.
//!
//! Column orders here must match the SELECT lists in the query modules.

use chrono::{DateTime, Utc};
use recall_core::types::{
    AspectType, AssignmentMethod, Cluster, Document, Entity, Episode, EpisodeType,
    IngestionQueueEntry, JobStatus, Space, Statement, StatementAttributes,
};
use recall_core::{Error, Result};
use std::str::FromStr;
use uuid::Uuid;

pub(crate) fn storage_err(e: impl std::fmt::Display) -> Error {
    Error::Storage(e.to_string())
}

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Storage(format!("invalid uuid {raw}: {e}")))
}

pub(crate) fn parse_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| Error::Storage(format!("timestamp out of range: {ms}")))
}

pub(crate) fn opt_uuid(raw: Option<String>) -> Result<Option<Uuid>> {
    raw.as_deref().map(parse_uuid).transpose()
}

pub(crate) fn opt_millis(ms: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    ms.map(parse_millis).transpose()
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(raw: &str, what: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| Error::Storage(format!("invalid {what} JSON: {e}")))
}

pub(crate) fn opt_embedding(raw: Option<String>) -> Result<Option<Vec<f32>>> {
    raw.as_deref()
        .map(|json| parse_json::<Vec<f32>>(json, "embedding"))
        .transpose()
}

pub(crate) fn embedding_json(embedding: Option<&Vec<f32>>) -> Result<Option<String>> {
    embedding
        .map(|v| serde_json::to_string(v).map_err(Error::Serialization))
        .transpose()
}

/// SELECT uuid, user_id, content, original_content, content_embedding,
/// source, metadata, created_at, valid_at, labels, space_id, session_id,
/// episode_type
pub(crate) fn row_to_episode(row: &libsql::Row) -> Result<Episode> {
    let uuid: String = row.get(0).map_err(storage_err)?;
    let user_id: String = row.get(1).map_err(storage_err)?;
    let content: String = row.get(2).map_err(storage_err)?;
    let original_content: String = row.get(3).map_err(storage_err)?;
    let content_embedding: Option<String> = row.get(4).ok();
    let source: String = row.get(5).map_err(storage_err)?;
    let metadata_json: String = row.get(6).map_err(storage_err)?;
    let created_at: i64 = row.get(7).map_err(storage_err)?;
    let valid_at: i64 = row.get(8).map_err(storage_err)?;
    let labels_json: String = row.get(9).map_err(storage_err)?;
    let space_id: Option<String> = row.get(10).ok();
    let session_id: Option<String> = row.get(11).ok();
    let episode_type: String = row.get(12).map_err(storage_err)?;

    Ok(Episode {
        uuid: parse_uuid(&uuid)?,
        content,
        original_content,
        content_embedding: opt_embedding(content_embedding)?,
        source,
        metadata: parse_json(&metadata_json, "episode metadata")?,
        created_at: parse_millis(created_at)?,
        valid_at: parse_millis(valid_at)?,
        labels: parse_json(&labels_json, "episode labels")?,
        user_id,
        space_id: opt_uuid(space_id)?,
        session_id,
        episode_type: EpisodeType::from_str(&episode_type).map_err(Error::Storage)?,
    })
}

/// SELECT uuid, user_id, name, entity_type, attributes, name_embedding,
/// type_embedding, created_at, space_id
pub(crate) fn row_to_entity(row: &libsql::Row) -> Result<Entity> {
    let uuid: String = row.get(0).map_err(storage_err)?;
    let user_id: String = row.get(1).map_err(storage_err)?;
    let name: String = row.get(2).map_err(storage_err)?;
    let entity_type: Option<String> = row.get(3).ok();
    let attributes_json: String = row.get(4).map_err(storage_err)?;
    let name_embedding: Option<String> = row.get(5).ok();
    let type_embedding: Option<String> = row.get(6).ok();
    let created_at: i64 = row.get(7).map_err(storage_err)?;
    let space_id: Option<String> = row.get(8).ok();

    Ok(Entity {
        uuid: parse_uuid(&uuid)?,
        name,
        entity_type,
        attributes: parse_json(&attributes_json, "entity attributes")?,
        name_embedding: opt_embedding(name_embedding)?,
        type_embedding: opt_embedding(type_embedding)?,
        created_at: parse_millis(created_at)?,
        user_id,
        space_id: opt_uuid(space_id)?,
    })
}

/// SELECT uuid, user_id, fact, fact_embedding, created_at, valid_at,
/// invalid_at, invalidated_by, attributes, space_id, space_ids,
/// last_space_assignment, space_assignment_method, cluster_id
pub(crate) fn row_to_statement(row: &libsql::Row) -> Result<Statement> {
    let uuid: String = row.get(0).map_err(storage_err)?;
    let user_id: String = row.get(1).map_err(storage_err)?;
    let fact: String = row.get(2).map_err(storage_err)?;
    let fact_embedding: Option<String> = row.get(3).ok();
    let created_at: i64 = row.get(4).map_err(storage_err)?;
    let valid_at: i64 = row.get(5).map_err(storage_err)?;
    let invalid_at: Option<i64> = row.get(6).ok();
    let invalidated_by: Option<String> = row.get(7).ok();
    let attributes_json: String = row.get(8).map_err(storage_err)?;
    let space_id: Option<String> = row.get(9).ok();
    let space_ids_json: String = row.get(10).map_err(storage_err)?;
    let last_space_assignment: Option<i64> = row.get(11).ok();
    let space_assignment_method: Option<String> = row.get(12).ok();
    let cluster_id: Option<String> = row.get(13).ok();

    let attributes: StatementAttributes =
        parse_json(&attributes_json, "statement attributes")?;
    let space_ids: Vec<String> = parse_json(&space_ids_json, "statement space_ids")?;

    Ok(Statement {
        uuid: parse_uuid(&uuid)?,
        fact,
        fact_embedding: opt_embedding(fact_embedding)?,
        created_at: parse_millis(created_at)?,
        valid_at: parse_millis(valid_at)?,
        invalid_at: opt_millis(invalid_at)?,
        invalidated_by: opt_uuid(invalidated_by)?,
        attributes,
        user_id,
        space_id: opt_uuid(space_id)?,
        space_ids: space_ids
            .iter()
            .map(|raw| parse_uuid(raw))
            .collect::<Result<Vec<_>>>()?,
        last_space_assignment: opt_millis(last_space_assignment)?,
        space_assignment_method: space_assignment_method
            .as_deref()
            .map(|raw| match raw {
                "manual" => Ok(AssignmentMethod::Manual),
                "llm" => Ok(AssignmentMethod::Llm),
                other => Err(Error::Storage(format!("unknown assignment method: {other}"))),
            })
            .transpose()?,
        cluster_id: opt_uuid(cluster_id)?,
    })
}

/// SELECT uuid, title, original_content, source, user_id, session_id,
/// version, content_hash, chunk_hashes, previous_version_uuid, total_chunks,
/// created_at, updated_at
pub(crate) fn row_to_document(row: &libsql::Row) -> Result<Document> {
    let uuid: String = row.get(0).map_err(storage_err)?;
    let title: String = row.get(1).map_err(storage_err)?;
    let original_content: String = row.get(2).map_err(storage_err)?;
    let source: String = row.get(3).map_err(storage_err)?;
    let user_id: String = row.get(4).map_err(storage_err)?;
    let session_id: String = row.get(5).map_err(storage_err)?;
    let version: i64 = row.get(6).map_err(storage_err)?;
    let content_hash: String = row.get(7).map_err(storage_err)?;
    let chunk_hashes_json: String = row.get(8).map_err(storage_err)?;
    let previous_version_uuid: Option<String> = row.get(9).ok();
    let total_chunks: i64 = row.get(10).map_err(storage_err)?;
    let created_at: i64 = row.get(11).map_err(storage_err)?;
    let updated_at: i64 = row.get(12).map_err(storage_err)?;

    Ok(Document {
        uuid: parse_uuid(&uuid)?,
        title,
        original_content,
        source,
        user_id,
        session_id,
        version: u32::try_from(version)
            .map_err(|_| Error::Storage(format!("negative document version: {version}")))?,
        content_hash,
        chunk_hashes: parse_json(&chunk_hashes_json, "document chunk_hashes")?,
        previous_version_uuid: opt_uuid(previous_version_uuid)?,
        total_chunks: usize::try_from(total_chunks).unwrap_or(0),
        created_at: parse_millis(created_at)?,
        updated_at: parse_millis(updated_at)?,
    })
}

/// SELECT uuid, name, description, aspect_type, size, cluster_embedding,
/// embedding_count, cohesion_score, top_subjects, top_predicates,
/// top_objects, needs_naming, evolved, evolved_at, user_id, created_at,
/// updated_at
pub(crate) fn row_to_cluster(row: &libsql::Row) -> Result<Cluster> {
    let uuid: String = row.get(0).map_err(storage_err)?;
    let name: String = row.get(1).map_err(storage_err)?;
    let description: String = row.get(2).map_err(storage_err)?;
    let aspect_type: String = row.get(3).map_err(storage_err)?;
    let size: i64 = row.get(4).map_err(storage_err)?;
    let cluster_embedding: Option<String> = row.get(5).ok();
    let embedding_count: i64 = row.get(6).map_err(storage_err)?;
    let cohesion_score: Option<f64> = row.get(7).ok();
    let top_subjects: String = row.get(8).map_err(storage_err)?;
    let top_predicates: String = row.get(9).map_err(storage_err)?;
    let top_objects: String = row.get(10).map_err(storage_err)?;
    let needs_naming: i64 = row.get(11).map_err(storage_err)?;
    let evolved: i64 = row.get(12).map_err(storage_err)?;
    let evolved_at: Option<i64> = row.get(13).ok();
    let user_id: String = row.get(14).map_err(storage_err)?;
    let created_at: i64 = row.get(15).map_err(storage_err)?;
    let updated_at: i64 = row.get(16).map_err(storage_err)?;

    Ok(Cluster {
        uuid: parse_uuid(&uuid)?,
        name,
        description,
        aspect_type: AspectType::from_str(&aspect_type).map_err(Error::Storage)?,
        size: usize::try_from(size).unwrap_or(0),
        cluster_embedding: opt_embedding(cluster_embedding)?,
        embedding_count: usize::try_from(embedding_count).unwrap_or(0),
        cohesion_score: cohesion_score.map(|v| v as f32),
        top_subjects: parse_json(&top_subjects, "cluster top_subjects")?,
        top_predicates: parse_json(&top_predicates, "cluster top_predicates")?,
        top_objects: parse_json(&top_objects, "cluster top_objects")?,
        needs_naming: needs_naming != 0,
        evolved: evolved != 0,
        evolved_at: opt_millis(evolved_at)?,
        user_id,
        created_at: parse_millis(created_at)?,
        updated_at: parse_millis(updated_at)?,
    })
}

/// SELECT uuid, name, description, user_id, workspace_id, is_active,
/// statement_count_at_last_trigger, last_pattern_trigger, created_at,
/// updated_at
pub(crate) fn row_to_space(row: &libsql::Row) -> Result<Space> {
    let uuid: String = row.get(0).map_err(storage_err)?;
    let name: String = row.get(1).map_err(storage_err)?;
    let description: String = row.get(2).map_err(storage_err)?;
    let user_id: String = row.get(3).map_err(storage_err)?;
    let workspace_id: String = row.get(4).map_err(storage_err)?;
    let is_active: i64 = row.get(5).map_err(storage_err)?;
    let count_at_trigger: Option<i64> = row.get(6).ok();
    let last_pattern_trigger: Option<i64> = row.get(7).ok();
    let created_at: i64 = row.get(8).map_err(storage_err)?;
    let updated_at: i64 = row.get(9).map_err(storage_err)?;

    Ok(Space {
        uuid: parse_uuid(&uuid)?,
        name,
        description,
        user_id,
        workspace_id,
        is_active: is_active != 0,
        statement_count_at_last_trigger: count_at_trigger.map(|v| v.max(0) as u64),
        last_pattern_trigger: opt_millis(last_pattern_trigger)?,
        created_at: parse_millis(created_at)?,
        updated_at: parse_millis(updated_at)?,
    })
}

/// SELECT id, workspace_id, space_id, priority, data, output, error, status,
/// created_at, updated_at
pub(crate) fn row_to_queue_entry(row: &libsql::Row) -> Result<IngestionQueueEntry> {
    let id: String = row.get(0).map_err(storage_err)?;
    let workspace_id: String = row.get(1).map_err(storage_err)?;
    let space_id: Option<String> = row.get(2).ok();
    let priority: i64 = row.get(3).map_err(storage_err)?;
    let data_json: String = row.get(4).map_err(storage_err)?;
    let output_json: Option<String> = row.get(5).ok();
    let error: Option<String> = row.get(6).ok();
    let status: String = row.get(7).map_err(storage_err)?;
    let created_at: i64 = row.get(8).map_err(storage_err)?;
    let updated_at: i64 = row.get(9).map_err(storage_err)?;

    Ok(IngestionQueueEntry {
        id: parse_uuid(&id)?,
        workspace_id,
        space_id: opt_uuid(space_id)?,
        priority: i32::try_from(priority).unwrap_or(0),
        data: parse_json(&data_json, "queue entry data")?,
        output: output_json
            .as_deref()
            .map(|json| parse_json(json, "queue entry output"))
            .transpose()?,
        error,
        status: JobStatus::from_str(&status).map_err(Error::Storage)?,
        created_at: parse_millis(created_at)?,
        updated_at: parse_millis(updated_at)?,
    })
}
