//! # Space Service
//!
//! User-defined topic spaces: CRUD, statement assignment, and the
//! growth-triggered background pattern analysis that lets the model sort
//! statements into spaces.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::constants::SPACE_TRIGGER_GROWTH;
use crate::error::{Error, Result};
use crate::graph::{GraphStore, SpaceStore, SpaceUpdate};
use crate::llm::{prompts, Complexity, LanguageModel};
use crate::types::{AssignmentMethod, Space, Statement};

/// Maximum space name length accepted by the API
pub const MAX_NAME_LENGTH: usize = 100;
/// Maximum space description length accepted by the API
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;
/// Statements per LLM assignment batch
const ASSIGNMENT_BATCH_SIZE: usize = 50;

/// Parameters for creating a space
#[derive(Debug, Clone)]
pub struct CreateSpaceParams {
    pub name: String,
    pub description: String,
    pub user_id: String,
    pub workspace_id: String,
}

/// Space CRUD plus LLM-driven statement assignment
pub struct SpaceService {
    graph: Arc<dyn GraphStore>,
    spaces: Arc<dyn SpaceStore>,
    model: Arc<dyn LanguageModel>,
}

impl SpaceService {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        spaces: Arc<dyn SpaceStore>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            graph,
            spaces,
            model,
        }
    }

    fn validate_lengths(name: &str, description: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::Validation("space name must not be empty".into()));
        }
        if name.len() > MAX_NAME_LENGTH {
            return Err(Error::Validation(format!(
                "space name exceeds {MAX_NAME_LENGTH} characters"
            )));
        }
        if description.len() > MAX_DESCRIPTION_LENGTH {
            return Err(Error::Validation(format!(
                "space description exceeds {MAX_DESCRIPTION_LENGTH} characters"
            )));
        }
        Ok(())
    }

    /// Create a space; names are unique per workspace (enforced by the store)
    #[instrument(skip(self, params), fields(workspace_id = %params.workspace_id))]
    pub async fn create_space(&self, params: CreateSpaceParams) -> Result<Space> {
        Self::validate_lengths(&params.name, &params.description)?;
        let space = Space::new(
            params.name,
            params.description,
            params.user_id,
            params.workspace_id,
        );
        self.spaces.create_space(&space).await?;
        info!(space = %space.uuid, "Space created");
        Ok(space)
    }

    pub async fn get_space(&self, space_id: Uuid) -> Result<Option<Space>> {
        self.spaces.get_space(space_id).await
    }

    pub async fn list_spaces(&self, workspace_id: &str) -> Result<Vec<Space>> {
        self.spaces.list_spaces(workspace_id).await
    }

    pub async fn update_space(&self, space_id: Uuid, update: SpaceUpdate) -> Result<Space> {
        if let Some(name) = &update.name {
            Self::validate_lengths(name, update.description.as_deref().unwrap_or(""))?;
        } else if let Some(description) = &update.description {
            if description.len() > MAX_DESCRIPTION_LENGTH {
                return Err(Error::Validation(format!(
                    "space description exceeds {MAX_DESCRIPTION_LENGTH} characters"
                )));
            }
        }
        self.spaces.update_space(space_id, &update).await
    }

    /// Delete a space and scrub its uuid from every statement's `space_ids`
    #[instrument(skip(self), fields(space_id = %space_id))]
    pub async fn delete_space(&self, user_id: &str, space_id: Uuid) -> Result<()> {
        self.spaces.delete_space(space_id).await?;
        let scrubbed = self.graph.scrub_space(user_id, space_id).await?;
        info!(scrubbed, "Space deleted and statements scrubbed");
        Ok(())
    }

    /// Manually assign statements to a space
    pub async fn assign_statements_to_space(
        &self,
        statement_ids: &[Uuid],
        space_id: Uuid,
    ) -> Result<()> {
        self.graph
            .add_statements_to_space(statement_ids, space_id, AssignmentMethod::Manual)
            .await
    }

    /// Remove statements from a space
    pub async fn remove_statements_from_space(
        &self,
        statement_ids: &[Uuid],
        space_id: Uuid,
    ) -> Result<()> {
        self.graph
            .remove_statements_from_space(statement_ids, space_id)
            .await
    }

    pub async fn get_space_statements(
        &self,
        user_id: &str,
        space_id: Uuid,
    ) -> Result<Vec<Statement>> {
        self.graph.get_space_statements(user_id, space_id).await
    }

    /// Fire pattern analysis for every armed space of the user.
    ///
    /// A space is armed when it has never been analysed or the user's
    /// statement count grew by [`SPACE_TRIGGER_GROWTH`] since the last
    /// trigger. The claim is an atomic compare-and-set in the relational
    /// store, so concurrent workers cannot double-fire.
    #[instrument(skip(self), fields(user_id = %user_id, workspace_id = %workspace_id))]
    pub async fn run_triggered_analysis(&self, user_id: &str, workspace_id: &str) -> Result<usize> {
        let current_count = self.graph.statement_count(user_id).await?;
        let spaces = self.spaces.list_spaces(workspace_id).await?;

        let mut analysed = 0;
        for space in spaces {
            if !space.is_active || space.user_id != user_id {
                continue;
            }
            let armed = match space.statement_count_at_last_trigger {
                None => true,
                Some(last) => current_count.saturating_sub(last) >= SPACE_TRIGGER_GROWTH,
            };
            if !armed {
                continue;
            }

            let claimed = self
                .spaces
                .try_claim_pattern_trigger(
                    space.uuid,
                    space.statement_count_at_last_trigger,
                    current_count,
                )
                .await?;
            if !claimed {
                debug!(space = %space.uuid, "Trigger claimed elsewhere; skipping");
                continue;
            }

            match self.assign_by_pattern(user_id, &space).await {
                Ok(assigned) => {
                    info!(space = %space.uuid, assigned, "Space pattern analysis complete");
                    analysed += 1;
                }
                Err(e) => {
                    // Background semantics: log and move to the next space
                    warn!(space = %space.uuid, error = %e, "Space pattern analysis failed");
                }
            }
        }
        Ok(analysed)
    }

    /// Ask the model which of the user's valid statements belong to the
    /// space, in batches. Per-batch failures are logged and skipped.
    async fn assign_by_pattern(&self, user_id: &str, space: &Space) -> Result<usize> {
        let statements = self.graph.valid_statements(user_id).await?;
        let unassigned: Vec<&Statement> = statements
            .iter()
            .filter(|s| !s.space_ids.contains(&space.uuid))
            .collect();
        if unassigned.is_empty() {
            return Ok(0);
        }

        let mut assigned_total = 0;
        for batch in unassigned.chunks(ASSIGNMENT_BATCH_SIZE) {
            let rows: Vec<(String, String)> = batch
                .iter()
                .map(|s| (s.uuid.to_string(), s.fact.clone()))
                .collect();
            let messages = prompts::space_assignment(&space.name, &space.description, &rows);

            let generation = match self.model.generate(&messages, Complexity::Low).await {
                Ok(generation) => generation,
                Err(e) => {
                    warn!(error = %e, "Space assignment batch failed; continuing");
                    continue;
                }
            };
            let matched: Vec<Uuid> = match crate::llm::parse_json_output(&generation.text) {
                Ok(matched) => matched,
                Err(e) => {
                    warn!(error = %e, "Space assignment verdict unparseable; skipping batch");
                    continue;
                }
            };

            // Only ids actually offered in this batch count
            let offered: std::collections::HashSet<Uuid> =
                batch.iter().map(|s| s.uuid).collect();
            let accepted: Vec<Uuid> = matched
                .into_iter()
                .filter(|id| offered.contains(id))
                .collect();
            if accepted.is_empty() {
                continue;
            }
            self.graph
                .add_statements_to_space(&accepted, space.uuid, AssignmentMethod::Llm)
                .await?;
            assigned_total += accepted.len();
        }

        Ok(assigned_total)
    }
}
