//! Node upserts, the episode deletion cascade, and invalidation.

use chrono::{DateTime, Utc};
use libsql::params;
use recall_core::graph::{EpisodeDeletion, StatementTriple};
use recall_core::types::{Document, Entity, Episode, Statement};
use recall_core::{Error, Result};
use tracing::{debug, info};
use uuid::Uuid;

use crate::rows::{
    embedding_json, row_to_document, row_to_episode, row_to_statement, storage_err,
};
use crate::TursoGraphStore;

pub(crate) const EPISODE_COLUMNS: &str = "uuid, user_id, content, original_content, \
     content_embedding, source, metadata, created_at, valid_at, labels, space_id, \
     session_id, episode_type";

pub(crate) const STATEMENT_COLUMNS: &str = "uuid, user_id, fact, fact_embedding, created_at, \
     valid_at, invalid_at, invalidated_by, attributes, space_id, space_ids, \
     last_space_assignment, space_assignment_method, cluster_id";

pub(crate) const DOCUMENT_COLUMNS: &str = "uuid, title, original_content, source, user_id, \
     session_id, version, content_hash, chunk_hashes, previous_version_uuid, total_chunks, \
     created_at, updated_at";

/// Build `?, ?, …` placeholders and the matching string params for an
/// `IN (…)` clause over uuids
pub(crate) fn uuid_in_clause(ids: &[Uuid]) -> (String, Vec<libsql::Value>) {
    let placeholders = vec!["?"; ids.len()].join(", ");
    let values = ids
        .iter()
        .map(|id| libsql::Value::Text(id.to_string()))
        .collect();
    (placeholders, values)
}

impl TursoGraphStore {
    /// Store an episode. `INSERT OR REPLACE` gives upsert semantics keyed
    /// by uuid.
    pub(crate) async fn save_episode_impl(&self, episode: &Episode) -> Result<()> {
        debug!("Storing episode: {}", episode.uuid);
        let conn = self.connect()?;

        let sql = format!(
            "INSERT OR REPLACE INTO episodes ({EPISODE_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        conn.execute(
            &sql,
            params![
                episode.uuid.to_string(),
                episode.user_id.clone(),
                episode.content.clone(),
                episode.original_content.clone(),
                embedding_json(episode.content_embedding.as_ref())?,
                episode.source.clone(),
                serde_json::to_string(&episode.metadata).map_err(Error::Serialization)?,
                episode.created_at.timestamp_millis(),
                episode.valid_at.timestamp_millis(),
                serde_json::to_string(&episode.labels).map_err(Error::Serialization)?,
                episode.space_id.map(|id| id.to_string()),
                episode.session_id.clone(),
                episode.episode_type.to_string(),
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to store episode: {e}")))?;
        Ok(())
    }

    pub(crate) async fn get_episode_impl(
        &self,
        user_id: &str,
        uuid: Uuid,
    ) -> Result<Option<Episode>> {
        let conn = self.connect()?;
        let sql =
            format!("SELECT {EPISODE_COLUMNS} FROM episodes WHERE uuid = ? AND user_id = ?");
        let mut rows = conn
            .query(&sql, params![uuid.to_string(), user_id])
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_episode(&row)?)),
            None => Ok(None),
        }
    }

    /// Delete an episode and cascade to statements it solely evidenced and
    /// entities those statements solely referenced.
    pub(crate) async fn delete_episode_impl(
        &self,
        user_id: &str,
        uuid: Uuid,
    ) -> Result<EpisodeDeletion> {
        let conn = self.connect()?;
        let episode_id = uuid.to_string();

        // Statements whose only provenance is this episode
        let mut rows = conn
            .query(
                "SELECT pe.statement_uuid FROM provenance_edges pe
                 WHERE pe.episode_uuid = ?1
                   AND (SELECT COUNT(*) FROM provenance_edges p2
                        WHERE p2.statement_uuid = pe.statement_uuid) = 1",
                params![episode_id.clone()],
            )
            .await
            .map_err(storage_err)?;
        let mut doomed_statements: Vec<String> = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            doomed_statements.push(row.get(0).map_err(storage_err)?);
        }

        // Entities those statements touch; orphans are checked after the
        // statement edges are gone
        let mut touched_entities: Vec<String> = Vec::new();
        for statement_id in &doomed_statements {
            let mut rows = conn
                .query(
                    "SELECT entity_uuid FROM statement_edges WHERE statement_uuid = ?",
                    params![statement_id.clone()],
                )
                .await
                .map_err(storage_err)?;
            while let Some(row) = rows.next().await.map_err(storage_err)? {
                touched_entities.push(row.get(0).map_err(storage_err)?);
            }
        }

        for statement_id in &doomed_statements {
            conn.execute(
                "DELETE FROM statement_edges WHERE statement_uuid = ?",
                params![statement_id.clone()],
            )
            .await
            .map_err(storage_err)?;
            conn.execute(
                "DELETE FROM statements WHERE uuid = ?",
                params![statement_id.clone()],
            )
            .await
            .map_err(storage_err)?;
        }

        conn.execute(
            "DELETE FROM provenance_edges WHERE episode_uuid = ?",
            params![episode_id.clone()],
        )
        .await
        .map_err(storage_err)?;
        conn.execute(
            "DELETE FROM document_chunks WHERE episode_uuid = ?",
            params![episode_id.clone()],
        )
        .await
        .map_err(storage_err)?;
        conn.execute(
            "DELETE FROM episodes WHERE uuid = ? AND user_id = ?",
            params![episode_id, user_id],
        )
        .await
        .map_err(storage_err)?;

        // Entities with no remaining statement edges
        touched_entities.sort_unstable();
        touched_entities.dedup();
        let mut entities_removed = 0usize;
        for entity_id in touched_entities {
            let removed = conn
                .execute(
                    "DELETE FROM entities WHERE uuid = ?1
                     AND NOT EXISTS (SELECT 1 FROM statement_edges WHERE entity_uuid = ?1)",
                    params![entity_id],
                )
                .await
                .map_err(storage_err)?;
            entities_removed += removed as usize;
        }

        info!(
            episode = %uuid,
            statements_removed = doomed_statements.len(),
            entities_removed,
            "Episode deleted with cascade"
        );
        Ok(EpisodeDeletion {
            statements_removed: doomed_statements.len(),
            entities_removed,
        })
    }

    pub(crate) async fn save_entity_impl(&self, entity: &Entity) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO entities (uuid, user_id, name, name_lower, entity_type, \
             attributes, name_embedding, type_embedding, created_at, space_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                entity.uuid.to_string(),
                entity.user_id.clone(),
                entity.name.clone(),
                entity.name.to_lowercase(),
                entity.entity_type.clone(),
                serde_json::to_string(&entity.attributes).map_err(Error::Serialization)?,
                embedding_json(entity.name_embedding.as_ref())?,
                embedding_json(entity.type_embedding.as_ref())?,
                entity.created_at.timestamp_millis(),
                entity.space_id.map(|id| id.to_string()),
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to store entity: {e}")))?;
        Ok(())
    }

    pub(crate) async fn save_statement_impl(&self, statement: &Statement) -> Result<()> {
        let conn = self.connect()?;
        let sql = format!(
            "INSERT OR REPLACE INTO statements ({STATEMENT_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        conn.execute(
            &sql,
            params![
                statement.uuid.to_string(),
                statement.user_id.clone(),
                statement.fact.clone(),
                embedding_json(statement.fact_embedding.as_ref())?,
                statement.created_at.timestamp_millis(),
                statement.valid_at.timestamp_millis(),
                statement.invalid_at.map(|t| t.timestamp_millis()),
                statement.invalidated_by.map(|id| id.to_string()),
                serde_json::to_string(&statement.attributes).map_err(Error::Serialization)?,
                statement.space_id.map(|id| id.to_string()),
                serde_json::to_string(
                    &statement
                        .space_ids
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                )
                .map_err(Error::Serialization)?,
                statement.last_space_assignment.map(|t| t.timestamp_millis()),
                statement.space_assignment_method.map(|m| m.to_string()),
                statement.cluster_id.map(|id| id.to_string()),
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to store statement: {e}")))?;
        Ok(())
    }

    /// Upsert a full triple: the three entities, the statement, its
    /// HAS_SUBJECT/HAS_PREDICATE/HAS_OBJECT edges, and provenance.
    pub(crate) async fn save_triple_impl(
        &self,
        episode_uuid: Uuid,
        triple: &StatementTriple,
    ) -> Result<()> {
        self.save_entity_impl(&triple.subject).await?;
        self.save_entity_impl(&triple.predicate).await?;
        self.save_entity_impl(&triple.object).await?;
        self.save_statement_impl(&triple.statement).await?;

        let conn = self.connect()?;
        let now = Utc::now().timestamp_millis();
        for (role, entity) in [
            ("subject", &triple.subject),
            ("predicate", &triple.predicate),
            ("object", &triple.object),
        ] {
            conn.execute(
                "INSERT OR REPLACE INTO statement_edges \
                 (statement_uuid, role, entity_uuid, uuid, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    triple.statement.uuid.to_string(),
                    role,
                    entity.uuid.to_string(),
                    Uuid::new_v4().to_string(),
                    now,
                ],
            )
            .await
            .map_err(storage_err)?;
        }

        conn.execute(
            "INSERT OR IGNORE INTO provenance_edges \
             (episode_uuid, statement_uuid, uuid, created_at)
             VALUES (?, ?, ?, ?)",
            params![
                episode_uuid.to_string(),
                triple.statement.uuid.to_string(),
                Uuid::new_v4().to_string(),
                now,
            ],
        )
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    pub(crate) async fn link_provenance_impl(
        &self,
        episode_uuid: Uuid,
        statement_uuid: Uuid,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR IGNORE INTO provenance_edges \
             (episode_uuid, statement_uuid, uuid, created_at)
             VALUES (?, ?, ?, ?)",
            params![
                episode_uuid.to_string(),
                statement_uuid.to_string(),
                Uuid::new_v4().to_string(),
                Utc::now().timestamp_millis(),
            ],
        )
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    pub(crate) async fn save_document_impl(&self, document: &Document) -> Result<()> {
        let conn = self.connect()?;
        let sql = format!(
            "INSERT OR REPLACE INTO documents ({DOCUMENT_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        conn.execute(
            &sql,
            params![
                document.uuid.to_string(),
                document.title.clone(),
                document.original_content.clone(),
                document.source.clone(),
                document.user_id.clone(),
                document.session_id.clone(),
                i64::from(document.version),
                document.content_hash.clone(),
                serde_json::to_string(&document.chunk_hashes).map_err(Error::Serialization)?,
                document.previous_version_uuid.map(|id| id.to_string()),
                document.total_chunks as i64,
                document.created_at.timestamp_millis(),
                document.updated_at.timestamp_millis(),
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to store document: {e}")))?;
        Ok(())
    }

    pub(crate) async fn latest_document_impl(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<Document>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents
             WHERE user_id = ? AND session_id = ?
             ORDER BY version DESC LIMIT 1"
        );
        let mut rows = conn
            .query(&sql, params![user_id, session_id])
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_document(&row)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn link_episode_to_document_impl(
        &self,
        episode_uuid: Uuid,
        document_uuid: Uuid,
        chunk_index: usize,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO document_chunks \
             (document_uuid, episode_uuid, chunk_index, uuid, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                document_uuid.to_string(),
                episode_uuid.to_string(),
                chunk_index as i64,
                Uuid::new_v4().to_string(),
                Utc::now().timestamp_millis(),
            ],
        )
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    pub(crate) async fn document_statements_impl(
        &self,
        document_uuid: Uuid,
    ) -> Result<Vec<Statement>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {STATEMENT_COLUMNS} FROM statements
             WHERE uuid IN (
                 SELECT pe.statement_uuid FROM document_chunks dc
                 JOIN provenance_edges pe ON pe.episode_uuid = dc.episode_uuid
                 WHERE dc.document_uuid = ?
             )"
        );
        let mut rows = conn
            .query(&sql, params![document_uuid.to_string()])
            .await
            .map_err(storage_err)?;
        let mut statements = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            statements.push(row_to_statement(&row)?);
        }
        Ok(statements)
    }

    pub(crate) async fn document_chunk_statements_impl(
        &self,
        document_uuid: Uuid,
        chunk_indices: &[usize],
    ) -> Result<Vec<Statement>> {
        if chunk_indices.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.connect()?;
        let placeholders = vec!["?"; chunk_indices.len()].join(", ");
        let sql = format!(
            "SELECT {STATEMENT_COLUMNS} FROM statements
             WHERE uuid IN (
                 SELECT pe.statement_uuid FROM document_chunks dc
                 JOIN provenance_edges pe ON pe.episode_uuid = dc.episode_uuid
                 WHERE dc.document_uuid = ? AND dc.chunk_index IN ({placeholders})
             )"
        );
        let mut values = vec![libsql::Value::Text(document_uuid.to_string())];
        values.extend(
            chunk_indices
                .iter()
                .map(|&index| libsql::Value::Integer(index as i64)),
        );
        let mut rows = conn.query(&sql, values).await.map_err(storage_err)?;
        let mut statements = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            statements.push(row_to_statement(&row)?);
        }
        Ok(statements)
    }

    /// Bulk invalidation; already-invalid statements are left untouched and
    /// `invalid_at` never precedes `valid_at`.
    pub(crate) async fn invalidate_statements_impl(
        &self,
        statement_ids: &[Uuid],
        invalidated_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<usize> {
        if statement_ids.is_empty() {
            return Ok(0);
        }
        let conn = self.connect()?;
        let (placeholders, mut values) = uuid_in_clause(statement_ids);
        let sql = format!(
            "UPDATE statements
             SET invalid_at = MAX(valid_at, ?), invalidated_by = ?
             WHERE invalid_at IS NULL AND uuid IN ({placeholders})"
        );
        let mut params_vec = vec![
            libsql::Value::Integer(at.timestamp_millis()),
            libsql::Value::Text(invalidated_by.to_string()),
        ];
        params_vec.append(&mut values);
        let changed = conn
            .execute(&sql, params_vec)
            .await
            .map_err(|e| Error::Storage(format!("failed to invalidate statements: {e}")))?;
        debug!(invalidated = changed, by = %invalidated_by, "Statements invalidated");
        Ok(changed as usize)
    }
}
