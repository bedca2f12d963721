//! Search operations: vector ranking over per-user candidates, structural
//! statement lookups, fulltext, and the episode context window.

use libsql::params;
use recall_core::embeddings::cosine_similarity;
use recall_core::graph::{
    RecentEpisodesQuery, ScoredEntity, ScoredEpisode, ScoredStatement, SimilarEntityQuery,
    SimilarStatementQuery, StatementTriple,
};
use recall_core::types::{Entity, Episode, Statement};
use recall_core::Result;
use std::collections::HashSet;
use uuid::Uuid;

use crate::nodes::{EPISODE_COLUMNS, STATEMENT_COLUMNS};
use crate::rows::{row_to_entity, row_to_episode, row_to_statement, storage_err};
use crate::TursoGraphStore;

pub(crate) const ENTITY_COLUMNS: &str = "uuid, user_id, name, entity_type, attributes, \
     name_embedding, type_embedding, created_at, space_id";

impl TursoGraphStore {
    pub(crate) async fn find_similar_entities_impl(
        &self,
        query: &SimilarEntityQuery,
    ) -> Result<Vec<ScoredEntity>> {
        let conn = self.connect()?;
        // Candidates scoped per user (and type when given); cosine ranking
        // happens here in the adapter
        let (sql, params_vec) = if let Some(entity_type) = &query.entity_type {
            (
                format!(
                    "SELECT {ENTITY_COLUMNS} FROM entities
                     WHERE user_id = ? AND entity_type = ? AND name_embedding IS NOT NULL"
                ),
                vec![
                    libsql::Value::Text(query.user_id.clone()),
                    libsql::Value::Text(entity_type.clone()),
                ],
            )
        } else {
            (
                format!(
                    "SELECT {ENTITY_COLUMNS} FROM entities
                     WHERE user_id = ? AND name_embedding IS NOT NULL"
                ),
                vec![libsql::Value::Text(query.user_id.clone())],
            )
        };

        let mut rows = conn.query(&sql, params_vec).await.map_err(storage_err)?;
        let mut scored: Vec<ScoredEntity> = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let entity = row_to_entity(&row)?;
            let Some(embedding) = &entity.name_embedding else {
                continue;
            };
            let score = cosine_similarity(embedding, &query.embedding);
            if score >= query.threshold {
                scored.push(ScoredEntity { entity, score });
            }
        }
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(query.limit);
        Ok(scored)
    }

    pub(crate) async fn find_exact_predicate_matches_impl(
        &self,
        predicate_name: &str,
        user_id: &str,
    ) -> Result<Vec<Entity>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities
             WHERE user_id = ? AND entity_type = 'Predicate' AND name_lower = ?
             ORDER BY created_at ASC"
        );
        let mut rows = conn
            .query(&sql, params![user_id, predicate_name.to_lowercase()])
            .await
            .map_err(storage_err)?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            entities.push(row_to_entity(&row)?);
        }
        Ok(entities)
    }

    /// Valid statements sharing subject and predicate with the probe
    pub(crate) async fn find_contradictory_statements_impl(
        &self,
        subject_id: Uuid,
        predicate_id: Uuid,
        user_id: &str,
    ) -> Result<Vec<Statement>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {STATEMENT_COLUMNS} FROM statements s
             WHERE s.user_id = ? AND s.invalid_at IS NULL
               AND EXISTS (SELECT 1 FROM statement_edges
                           WHERE statement_uuid = s.uuid AND role = 'subject' AND entity_uuid = ?)
               AND EXISTS (SELECT 1 FROM statement_edges
                           WHERE statement_uuid = s.uuid AND role = 'predicate' AND entity_uuid = ?)"
        );
        let mut rows = conn
            .query(
                &sql,
                params![user_id, subject_id.to_string(), predicate_id.to_string()],
            )
            .await
            .map_err(storage_err)?;
        let mut statements = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            statements.push(row_to_statement(&row)?);
        }
        Ok(statements)
    }

    /// Valid statements with the same subject and object but a different
    /// predicate
    pub(crate) async fn find_statements_with_same_subject_object_impl(
        &self,
        subject_id: Uuid,
        object_id: Uuid,
        exclude_predicate_id: Option<Uuid>,
        user_id: &str,
    ) -> Result<Vec<Statement>> {
        let conn = self.connect()?;
        let mut sql = format!(
            "SELECT {STATEMENT_COLUMNS} FROM statements s
             WHERE s.user_id = ? AND s.invalid_at IS NULL
               AND EXISTS (SELECT 1 FROM statement_edges
                           WHERE statement_uuid = s.uuid AND role = 'subject' AND entity_uuid = ?)
               AND EXISTS (SELECT 1 FROM statement_edges
                           WHERE statement_uuid = s.uuid AND role = 'object' AND entity_uuid = ?)"
        );
        let mut params_vec = vec![
            libsql::Value::Text(user_id.to_string()),
            libsql::Value::Text(subject_id.to_string()),
            libsql::Value::Text(object_id.to_string()),
        ];
        if let Some(predicate_id) = exclude_predicate_id {
            sql.push_str(
                " AND NOT EXISTS (SELECT 1 FROM statement_edges
                   WHERE statement_uuid = s.uuid AND role = 'predicate' AND entity_uuid = ?)",
            );
            params_vec.push(libsql::Value::Text(predicate_id.to_string()));
        }

        let mut rows = conn.query(&sql, params_vec).await.map_err(storage_err)?;
        let mut statements = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            statements.push(row_to_statement(&row)?);
        }
        Ok(statements)
    }

    pub(crate) async fn find_similar_statements_impl(
        &self,
        query: &SimilarStatementQuery,
    ) -> Result<Vec<ScoredStatement>> {
        let exclude: HashSet<Uuid> = query.exclude.iter().copied().collect();
        let mut scored = self
            .rank_statements(&query.embedding, &query.user_id, query.threshold)
            .await?;
        scored.retain(|s| !exclude.contains(&s.statement.uuid));
        scored.truncate(query.limit);
        Ok(scored)
    }

    pub(crate) async fn search_statements_by_embedding_impl(
        &self,
        embedding: &[f32],
        user_id: &str,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ScoredStatement>> {
        let mut scored = self.rank_statements(embedding, user_id, threshold).await?;
        scored.truncate(limit);
        Ok(scored)
    }

    /// Valid statements of the user ranked by cosine against the query
    async fn rank_statements(
        &self,
        embedding: &[f32],
        user_id: &str,
        threshold: f32,
    ) -> Result<Vec<ScoredStatement>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {STATEMENT_COLUMNS} FROM statements
             WHERE user_id = ? AND invalid_at IS NULL AND fact_embedding IS NOT NULL"
        );
        let mut rows = conn.query(&sql, params![user_id]).await.map_err(storage_err)?;
        let mut scored: Vec<ScoredStatement> = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let statement = row_to_statement(&row)?;
            let Some(fact_embedding) = &statement.fact_embedding else {
                continue;
            };
            let score = cosine_similarity(fact_embedding, embedding);
            if score >= threshold {
                scored.push(ScoredStatement { statement, score });
            }
        }
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored)
    }

    pub(crate) async fn search_episodes_by_embedding_impl(
        &self,
        embedding: &[f32],
        user_id: &str,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ScoredEpisode>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {EPISODE_COLUMNS} FROM episodes
             WHERE user_id = ? AND content_embedding IS NOT NULL"
        );
        let mut rows = conn.query(&sql, params![user_id]).await.map_err(storage_err)?;
        let mut scored: Vec<ScoredEpisode> = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let episode = row_to_episode(&row)?;
            let Some(content_embedding) = &episode.content_embedding else {
                continue;
            };
            let score = cosine_similarity(content_embedding, embedding);
            if score >= threshold {
                scored.push(ScoredEpisode { episode, score });
            }
        }
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    pub(crate) async fn search_statements_by_text_impl(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Statement>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {STATEMENT_COLUMNS} FROM statements
             WHERE user_id = ? AND uuid IN (
                 SELECT statement_uuid FROM statements_fts WHERE statements_fts MATCH ?
             )
             LIMIT ?"
        );
        let mut rows = conn
            .query(&sql, params![user_id, query, limit as i64])
            .await
            .map_err(storage_err)?;
        let mut statements = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            statements.push(row_to_statement(&row)?);
        }
        Ok(statements)
    }

    pub(crate) async fn search_entities_by_name_impl(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Entity>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities
             WHERE user_id = ? AND uuid IN (
                 SELECT entity_uuid FROM entities_fts WHERE entities_fts MATCH ?
             )
             LIMIT ?"
        );
        let mut rows = conn
            .query(&sql, params![user_id, query, limit as i64])
            .await
            .map_err(storage_err)?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            entities.push(row_to_entity(&row)?);
        }
        Ok(entities)
    }

    pub(crate) async fn get_episode_statements_impl(
        &self,
        episode_uuid: Uuid,
    ) -> Result<Vec<Statement>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {STATEMENT_COLUMNS} FROM statements
             WHERE uuid IN (
                 SELECT statement_uuid FROM provenance_edges WHERE episode_uuid = ?
             )"
        );
        let mut rows = conn
            .query(&sql, params![episode_uuid.to_string()])
            .await
            .map_err(storage_err)?;
        let mut statements = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            statements.push(row_to_statement(&row)?);
        }
        Ok(statements)
    }

    pub(crate) async fn get_recent_episodes_impl(
        &self,
        query: &RecentEpisodesQuery,
    ) -> Result<Vec<Episode>> {
        let conn = self.connect()?;
        let mut sql = format!(
            "SELECT {EPISODE_COLUMNS} FROM episodes
             WHERE user_id = ? AND valid_at <= ?"
        );
        let mut params_vec = vec![
            libsql::Value::Text(query.user_id.clone()),
            libsql::Value::Integer(query.before.timestamp_millis()),
        ];
        if let Some(source) = &query.source {
            sql.push_str(" AND source = ?");
            params_vec.push(libsql::Value::Text(source.clone()));
        }
        if let Some(session_id) = &query.session_id {
            sql.push_str(" AND session_id = ?");
            params_vec.push(libsql::Value::Text(session_id.clone()));
        }
        sql.push_str(" ORDER BY valid_at DESC LIMIT ?");
        params_vec.push(libsql::Value::Integer(query.limit as i64));

        let mut rows = conn.query(&sql, params_vec).await.map_err(storage_err)?;
        let mut episodes = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            episodes.push(row_to_episode(&row)?);
        }
        Ok(episodes)
    }

    pub(crate) async fn get_triple_for_statement_impl(
        &self,
        statement_id: Uuid,
    ) -> Result<Option<StatementTriple>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {STATEMENT_COLUMNS} FROM statements WHERE uuid = ?"
        );
        let mut rows = conn
            .query(&sql, params![statement_id.to_string()])
            .await
            .map_err(storage_err)?;
        let Some(row) = rows.next().await.map_err(storage_err)? else {
            return Ok(None);
        };
        let statement = row_to_statement(&row)?;

        let subject = self.entity_for_role(statement_id, "subject").await?;
        let predicate = self.entity_for_role(statement_id, "predicate").await?;
        let object = self.entity_for_role(statement_id, "object").await?;
        match (subject, predicate, object) {
            (Some(subject), Some(predicate), Some(object)) => Ok(Some(StatementTriple {
                statement,
                subject,
                predicate,
                object,
            })),
            _ => Ok(None),
        }
    }

    async fn entity_for_role(&self, statement_id: Uuid, role: &str) -> Result<Option<Entity>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE uuid = (
                 SELECT entity_uuid FROM statement_edges
                 WHERE statement_uuid = ? AND role = ?
             )"
        );
        let mut rows = conn
            .query(&sql, params![statement_id.to_string(), role])
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_entity(&row)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn statement_count_impl(&self, user_id: &str) -> Result<u64> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM statements WHERE user_id = ? AND invalid_at IS NULL",
                params![user_id],
            )
            .await
            .map_err(storage_err)?;
        let count: i64 = match rows.next().await.map_err(storage_err)? {
            Some(row) => row.get(0).map_err(storage_err)?,
            None => 0,
        };
        Ok(count.max(0) as u64)
    }
}
