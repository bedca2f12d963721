//! Relational store for user-defined spaces and their trigger bookkeeping.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::Space;

/// Partial update for a space; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct SpaceUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

/// Store for space rows.
///
/// Space *names* are unique per workspace; implementations enforce this on
/// create and rename.
#[async_trait]
pub trait SpaceStore: Send + Sync {
    async fn create_space(&self, space: &Space) -> Result<()>;

    async fn get_space(&self, space_id: Uuid) -> Result<Option<Space>>;

    async fn list_spaces(&self, workspace_id: &str) -> Result<Vec<Space>>;

    async fn update_space(&self, space_id: Uuid, update: &SpaceUpdate) -> Result<Space>;

    async fn delete_space(&self, space_id: Uuid) -> Result<()>;

    /// Atomically claim the pattern-analysis trigger.
    ///
    /// Succeeds only when the stored `statement_count_at_last_trigger` still
    /// matches `expected_last_count` (compare-and-set); on success both the
    /// count and `last_pattern_trigger` are updated in the same statement,
    /// so two concurrent claimants can never both fire.
    async fn try_claim_pattern_trigger(
        &self,
        space_id: Uuid,
        expected_last_count: Option<u64>,
        new_count: u64,
    ) -> Result<bool>;
}
