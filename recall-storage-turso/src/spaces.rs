//! Relational space rows and the atomic pattern-trigger claim.

use async_trait::async_trait;
use chrono::Utc;
use libsql::params;
use recall_core::graph::{SpaceStore, SpaceUpdate};
use recall_core::types::Space;
use recall_core::{Error, Result};
use uuid::Uuid;

use crate::rows::{row_to_space, storage_err};
use crate::TursoGraphStore;

const SPACE_COLUMNS: &str = "uuid, name, description, user_id, workspace_id, is_active, \
     statement_count_at_last_trigger, last_pattern_trigger, created_at, updated_at";

#[async_trait]
impl SpaceStore for TursoGraphStore {
    async fn create_space(&self, space: &Space) -> Result<()> {
        let conn = self.connect()?;
        let sql = format!(
            "INSERT INTO spaces ({SPACE_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        conn.execute(
            &sql,
            params![
                space.uuid.to_string(),
                space.name.clone(),
                space.description.clone(),
                space.user_id.clone(),
                space.workspace_id.clone(),
                i64::from(space.is_active),
                space.statement_count_at_last_trigger.map(|v| v as i64),
                space.last_pattern_trigger.map(|t| t.timestamp_millis()),
                space.created_at.timestamp_millis(),
                space.updated_at.timestamp_millis(),
            ],
        )
        .await
        .map_err(|e| {
            // The (workspace_id, name) unique constraint surfaces here
            if e.to_string().contains("UNIQUE") {
                Error::Validation(format!(
                    "space name '{}' already exists in this workspace",
                    space.name
                ))
            } else {
                Error::Storage(format!("failed to create space: {e}"))
            }
        })?;
        Ok(())
    }

    async fn get_space(&self, space_id: Uuid) -> Result<Option<Space>> {
        let conn = self.connect()?;
        let sql = format!("SELECT {SPACE_COLUMNS} FROM spaces WHERE uuid = ?");
        let mut rows = conn
            .query(&sql, params![space_id.to_string()])
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_space(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_spaces(&self, workspace_id: &str) -> Result<Vec<Space>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {SPACE_COLUMNS} FROM spaces WHERE workspace_id = ? ORDER BY created_at ASC"
        );
        let mut rows = conn
            .query(&sql, params![workspace_id])
            .await
            .map_err(storage_err)?;
        let mut spaces = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            spaces.push(row_to_space(&row)?);
        }
        Ok(spaces)
    }

    async fn update_space(&self, space_id: Uuid, update: &SpaceUpdate) -> Result<Space> {
        let conn = self.connect()?;
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<libsql::Value> = Vec::new();
        if let Some(name) = &update.name {
            sets.push("name = ?");
            values.push(libsql::Value::Text(name.clone()));
        }
        if let Some(description) = &update.description {
            sets.push("description = ?");
            values.push(libsql::Value::Text(description.clone()));
        }
        if let Some(is_active) = update.is_active {
            sets.push("is_active = ?");
            values.push(libsql::Value::Integer(i64::from(is_active)));
        }
        if !sets.is_empty() {
            sets.push("updated_at = ?");
            values.push(libsql::Value::Integer(Utc::now().timestamp_millis()));
            let sql = format!("UPDATE spaces SET {} WHERE uuid = ?", sets.join(", "));
            values.push(libsql::Value::Text(space_id.to_string()));
            conn.execute(&sql, values).await.map_err(|e| {
                if e.to_string().contains("UNIQUE") {
                    Error::Validation("space name already exists in this workspace".into())
                } else {
                    Error::Storage(format!("failed to update space: {e}"))
                }
            })?;
        }

        self.get_space(space_id)
            .await?
            .ok_or(Error::NotFound(space_id))
    }

    async fn delete_space(&self, space_id: Uuid) -> Result<()> {
        let conn = self.connect()?;
        let changed = conn
            .execute(
                "DELETE FROM spaces WHERE uuid = ?",
                params![space_id.to_string()],
            )
            .await
            .map_err(storage_err)?;
        if changed == 0 {
            return Err(Error::NotFound(space_id));
        }
        Ok(())
    }

    async fn try_claim_pattern_trigger(
        &self,
        space_id: Uuid,
        expected_last_count: Option<u64>,
        new_count: u64,
    ) -> Result<bool> {
        let conn = self.connect()?;
        // Compare-and-set: both bookkeeping fields move in one statement, so
        // concurrent claimants cannot double-fire
        let now = Utc::now().timestamp_millis();
        let changed = match expected_last_count {
            Some(expected) => conn
                .execute(
                    "UPDATE spaces
                     SET statement_count_at_last_trigger = ?, last_pattern_trigger = ?, updated_at = ?
                     WHERE uuid = ? AND statement_count_at_last_trigger = ?",
                    params![
                        new_count as i64,
                        now,
                        now,
                        space_id.to_string(),
                        expected as i64
                    ],
                )
                .await
                .map_err(storage_err)?,
            None => conn
                .execute(
                    "UPDATE spaces
                     SET statement_count_at_last_trigger = ?, last_pattern_trigger = ?, updated_at = ?
                     WHERE uuid = ? AND statement_count_at_last_trigger IS NULL",
                    params![new_count as i64, now, now, space_id.to_string()],
                )
                .await
                .map_err(storage_err)?,
        };
        Ok(changed > 0)
    }
}
