//! Clustering support: similarity-edge projection, cluster nodes, split
//! edges, assignments, and space membership on statements.

use chrono::Utc;
use libsql::params;
use recall_core::graph::{ClusterSplit, SimilarityEdge};
use recall_core::types::{AssignmentMethod, Cluster, Statement};
use recall_core::{Error, Result};
use uuid::Uuid;

use crate::nodes::{uuid_in_clause, STATEMENT_COLUMNS};
use crate::rows::{
    embedding_json, parse_json, parse_uuid, row_to_cluster, row_to_statement, storage_err,
};
use crate::TursoGraphStore;

const CLUSTER_COLUMNS: &str = "uuid, name, description, aspect_type, size, cluster_embedding, \
     embedding_count, cohesion_score, top_subjects, top_predicates, top_objects, needs_naming, \
     evolved, evolved_at, user_id, created_at, updated_at";

impl TursoGraphStore {
    pub(crate) async fn valid_statements_impl(&self, user_id: &str) -> Result<Vec<Statement>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {STATEMENT_COLUMNS} FROM statements
             WHERE user_id = ? AND invalid_at IS NULL"
        );
        let mut rows = conn.query(&sql, params![user_id]).await.map_err(storage_err)?;
        let mut statements = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            statements.push(row_to_statement(&row)?);
        }
        Ok(statements)
    }

    pub(crate) async fn unclustered_valid_statements_impl(
        &self,
        user_id: &str,
    ) -> Result<Vec<Statement>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {STATEMENT_COLUMNS} FROM statements
             WHERE user_id = ? AND invalid_at IS NULL AND cluster_id IS NULL"
        );
        let mut rows = conn.query(&sql, params![user_id]).await.map_err(storage_err)?;
        let mut statements = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            statements.push(row_to_statement(&row)?);
        }
        Ok(statements)
    }

    pub(crate) async fn valid_statement_entity_pairs_impl(
        &self,
        user_id: &str,
    ) -> Result<Vec<(Uuid, Uuid)>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT se.statement_uuid, se.entity_uuid
                 FROM statement_edges se
                 JOIN statements s ON s.uuid = se.statement_uuid
                 WHERE s.user_id = ? AND s.invalid_at IS NULL
                 ORDER BY se.statement_uuid, se.entity_uuid",
                params![user_id],
            )
            .await
            .map_err(storage_err)?;
        let mut pairs = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let statement: String = row.get(0).map_err(storage_err)?;
            let entity: String = row.get(1).map_err(storage_err)?;
            pairs.push((parse_uuid(&statement)?, parse_uuid(&entity)?));
        }
        Ok(pairs)
    }

    pub(crate) async fn merge_similarity_edges_impl(
        &self,
        user_id: &str,
        edges: &[SimilarityEdge],
    ) -> Result<()> {
        let conn = self.connect()?;
        for edge in edges {
            conn.execute(
                "INSERT OR REPLACE INTO similarity_edges \
                 (user_id, source_uuid, target_uuid, weight, shared_entities)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    user_id,
                    edge.source.to_string(),
                    edge.target.to_string(),
                    edge.weight,
                    serde_json::to_string(
                        &edge
                            .shared_entities
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                    )
                    .map_err(Error::Serialization)?,
                ],
            )
            .await
            .map_err(storage_err)?;
        }
        Ok(())
    }

    pub(crate) async fn similarity_edges_impl(&self, user_id: &str) -> Result<Vec<SimilarityEdge>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT source_uuid, target_uuid, weight, shared_entities
                 FROM similarity_edges WHERE user_id = ?
                 ORDER BY source_uuid, target_uuid",
                params![user_id],
            )
            .await
            .map_err(storage_err)?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let source: String = row.get(0).map_err(storage_err)?;
            let target: String = row.get(1).map_err(storage_err)?;
            let weight: f64 = row.get(2).map_err(storage_err)?;
            let shared_json: String = row.get(3).map_err(storage_err)?;
            let shared: Vec<String> = parse_json(&shared_json, "shared entities")?;
            edges.push(SimilarityEdge {
                source: parse_uuid(&source)?,
                target: parse_uuid(&target)?,
                weight,
                shared_entities: shared
                    .iter()
                    .map(|raw| parse_uuid(raw))
                    .collect::<Result<Vec<_>>>()?,
            });
        }
        Ok(edges)
    }

    pub(crate) async fn drop_similarity_edges_impl(&self, user_id: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "DELETE FROM similarity_edges WHERE user_id = ?",
            params![user_id],
        )
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    pub(crate) async fn assign_cluster_impl(
        &self,
        statement_ids: &[Uuid],
        cluster_id: Uuid,
    ) -> Result<()> {
        if statement_ids.is_empty() {
            return Ok(());
        }
        let conn = self.connect()?;
        let (placeholders, mut values) = uuid_in_clause(statement_ids);
        let sql = format!("UPDATE statements SET cluster_id = ? WHERE uuid IN ({placeholders})");
        let mut params_vec = vec![libsql::Value::Text(cluster_id.to_string())];
        params_vec.append(&mut values);
        conn.execute(&sql, params_vec).await.map_err(storage_err)?;
        Ok(())
    }

    pub(crate) async fn clear_cluster_assignments_impl(&self, user_id: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE statements SET cluster_id = NULL WHERE user_id = ?",
            params![user_id],
        )
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    pub(crate) async fn save_cluster_impl(&self, cluster: &Cluster) -> Result<()> {
        let conn = self.connect()?;
        let sql = format!(
            "INSERT OR REPLACE INTO clusters ({CLUSTER_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        conn.execute(
            &sql,
            params![
                cluster.uuid.to_string(),
                cluster.name.clone(),
                cluster.description.clone(),
                cluster.aspect_type.to_string(),
                cluster.size as i64,
                embedding_json(cluster.cluster_embedding.as_ref())?,
                cluster.embedding_count as i64,
                cluster.cohesion_score.map(f64::from),
                serde_json::to_string(&cluster.top_subjects).map_err(Error::Serialization)?,
                serde_json::to_string(&cluster.top_predicates).map_err(Error::Serialization)?,
                serde_json::to_string(&cluster.top_objects).map_err(Error::Serialization)?,
                i64::from(cluster.needs_naming),
                i64::from(cluster.evolved),
                cluster.evolved_at.map(|t| t.timestamp_millis()),
                cluster.user_id.clone(),
                cluster.created_at.timestamp_millis(),
                cluster.updated_at.timestamp_millis(),
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to store cluster: {e}")))?;
        Ok(())
    }

    pub(crate) async fn get_cluster_impl(&self, cluster_id: Uuid) -> Result<Option<Cluster>> {
        let conn = self.connect()?;
        let sql = format!("SELECT {CLUSTER_COLUMNS} FROM clusters WHERE uuid = ?");
        let mut rows = conn
            .query(&sql, params![cluster_id.to_string()])
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_cluster(&row)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn get_clusters_impl(&self, user_id: &str) -> Result<Vec<Cluster>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {CLUSTER_COLUMNS} FROM clusters WHERE user_id = ? ORDER BY created_at ASC"
        );
        let mut rows = conn.query(&sql, params![user_id]).await.map_err(storage_err)?;
        let mut clusters = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            clusters.push(row_to_cluster(&row)?);
        }
        Ok(clusters)
    }

    pub(crate) async fn delete_clusters_impl(&self, user_id: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM clusters WHERE user_id = ?", params![user_id])
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    pub(crate) async fn cluster_members_impl(&self, cluster_id: Uuid) -> Result<Vec<Statement>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {STATEMENT_COLUMNS} FROM statements
             WHERE cluster_id = ? AND invalid_at IS NULL"
        );
        let mut rows = conn
            .query(&sql, params![cluster_id.to_string()])
            .await
            .map_err(storage_err)?;
        let mut statements = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            statements.push(row_to_statement(&row)?);
        }
        Ok(statements)
    }

    pub(crate) async fn record_cluster_split_impl(
        &self,
        from_cluster: Uuid,
        to_cluster: Uuid,
        split: &ClusterSplit,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO cluster_splits \
             (from_cluster, to_cluster, reason, original_size, new_size, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                from_cluster.to_string(),
                to_cluster.to_string(),
                split.reason.clone(),
                split.original_size as i64,
                split.new_size as i64,
                Utc::now().timestamp_millis(),
            ],
        )
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    pub(crate) async fn cluster_splits_impl(
        &self,
        from_cluster: Uuid,
    ) -> Result<Vec<(Uuid, ClusterSplit)>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT to_cluster, reason, original_size, new_size
                 FROM cluster_splits WHERE from_cluster = ?
                 ORDER BY created_at ASC",
                params![from_cluster.to_string()],
            )
            .await
            .map_err(storage_err)?;
        let mut splits = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let to_cluster: String = row.get(0).map_err(storage_err)?;
            let reason: String = row.get(1).map_err(storage_err)?;
            let original_size: i64 = row.get(2).map_err(storage_err)?;
            let new_size: i64 = row.get(3).map_err(storage_err)?;
            splits.push((
                parse_uuid(&to_cluster)?,
                ClusterSplit {
                    reason,
                    original_size: usize::try_from(original_size).unwrap_or(0),
                    new_size: usize::try_from(new_size).unwrap_or(0),
                },
            ));
        }
        Ok(splits)
    }

    // ========== Space membership on statements ==========

    pub(crate) async fn add_statements_to_space_impl(
        &self,
        statement_ids: &[Uuid],
        space_id: Uuid,
        method: AssignmentMethod,
    ) -> Result<()> {
        if statement_ids.is_empty() {
            return Ok(());
        }
        // Read-modify-write per statement: space_ids is a JSON array and
        // membership is a set
        let now = Utc::now().timestamp_millis();
        for statement_id in statement_ids {
            let conn = self.connect()?;
            let mut rows = conn
                .query(
                    "SELECT space_ids FROM statements WHERE uuid = ?",
                    params![statement_id.to_string()],
                )
                .await
                .map_err(storage_err)?;
            let Some(row) = rows.next().await.map_err(storage_err)? else {
                continue;
            };
            let raw: String = row.get(0).map_err(storage_err)?;
            let mut space_ids: Vec<String> = parse_json(&raw, "statement space_ids")?;
            let space_text = space_id.to_string();
            if !space_ids.contains(&space_text) {
                space_ids.push(space_text);
            }
            conn.execute(
                "UPDATE statements
                 SET space_ids = ?, last_space_assignment = ?, space_assignment_method = ?
                 WHERE uuid = ?",
                params![
                    serde_json::to_string(&space_ids).map_err(Error::Serialization)?,
                    now,
                    method.to_string(),
                    statement_id.to_string(),
                ],
            )
            .await
            .map_err(storage_err)?;
        }
        Ok(())
    }

    pub(crate) async fn remove_statements_from_space_impl(
        &self,
        statement_ids: &[Uuid],
        space_id: Uuid,
    ) -> Result<()> {
        for statement_id in statement_ids {
            self.remove_space_membership(*statement_id, space_id).await?;
        }
        Ok(())
    }

    async fn remove_space_membership(&self, statement_id: Uuid, space_id: Uuid) -> Result<()> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT space_ids FROM statements WHERE uuid = ?",
                params![statement_id.to_string()],
            )
            .await
            .map_err(storage_err)?;
        let Some(row) = rows.next().await.map_err(storage_err)? else {
            return Ok(());
        };
        let raw: String = row.get(0).map_err(storage_err)?;
        let mut space_ids: Vec<String> = parse_json(&raw, "statement space_ids")?;
        let space_text = space_id.to_string();
        let before = space_ids.len();
        space_ids.retain(|id| id != &space_text);
        if space_ids.len() == before {
            return Ok(());
        }
        conn.execute(
            "UPDATE statements SET space_ids = ? WHERE uuid = ?",
            params![
                serde_json::to_string(&space_ids).map_err(Error::Serialization)?,
                statement_id.to_string(),
            ],
        )
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    /// Remove the space from every statement of the user. Returns the number
    /// of statements actually modified.
    pub(crate) async fn scrub_space_impl(&self, user_id: &str, space_id: Uuid) -> Result<usize> {
        let conn = self.connect()?;
        // JSON arrays make a single UPDATE awkward; find the members first
        let pattern = format!("%{space_id}%");
        let mut rows = conn
            .query(
                "SELECT uuid FROM statements WHERE user_id = ? AND space_ids LIKE ?",
                params![user_id, pattern],
            )
            .await
            .map_err(storage_err)?;
        let mut members = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let raw: String = row.get(0).map_err(storage_err)?;
            members.push(parse_uuid(&raw)?);
        }
        for statement_id in &members {
            self.remove_space_membership(*statement_id, space_id).await?;
        }
        Ok(members.len())
    }

    pub(crate) async fn get_space_statements_impl(
        &self,
        user_id: &str,
        space_id: Uuid,
    ) -> Result<Vec<Statement>> {
        let conn = self.connect()?;
        let pattern = format!("%{space_id}%");
        let sql = format!(
            "SELECT {STATEMENT_COLUMNS} FROM statements
             WHERE user_id = ? AND invalid_at IS NULL AND space_ids LIKE ?"
        );
        let mut rows = conn
            .query(&sql, params![user_id, pattern])
            .await
            .map_err(storage_err)?;
        let mut statements = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let statement = row_to_statement(&row)?;
            // LIKE is a prefilter; verify true membership
            if statement.space_ids.contains(&space_id) {
                statements.push(statement);
            }
        }
        Ok(statements)
    }
}
