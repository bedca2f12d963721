//! `GraphStore` trait implementation, delegating to the inherent query
//! methods defined in `nodes`, `search`, and `clusters`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recall_core::graph::{
    ClusterSplit, EpisodeDeletion, GraphStore, RecentEpisodesQuery, ScoredEntity, ScoredEpisode,
    ScoredStatement, SimilarEntityQuery, SimilarStatementQuery, SimilarityEdge, StatementTriple,
};
use recall_core::types::{AssignmentMethod, Cluster, Document, Entity, Episode, Statement};
use recall_core::Result;
use uuid::Uuid;

use crate::TursoGraphStore;

#[async_trait]
impl GraphStore for TursoGraphStore {
    async fn init_schema(&self) -> Result<bool> {
        Ok(self.initialize_schema().await)
    }

    async fn save_episode(&self, episode: &Episode) -> Result<()> {
        self.save_episode_impl(episode).await
    }

    async fn get_episode(&self, user_id: &str, uuid: Uuid) -> Result<Option<Episode>> {
        self.get_episode_impl(user_id, uuid).await
    }

    async fn delete_episode(&self, user_id: &str, uuid: Uuid) -> Result<EpisodeDeletion> {
        self.delete_episode_impl(user_id, uuid).await
    }

    async fn save_entity(&self, entity: &Entity) -> Result<()> {
        self.save_entity_impl(entity).await
    }

    async fn save_statement(&self, statement: &Statement) -> Result<()> {
        self.save_statement_impl(statement).await
    }

    async fn save_triple(&self, episode_uuid: Uuid, triple: &StatementTriple) -> Result<()> {
        self.save_triple_impl(episode_uuid, triple).await
    }

    async fn link_provenance(&self, episode_uuid: Uuid, statement_uuid: Uuid) -> Result<()> {
        self.link_provenance_impl(episode_uuid, statement_uuid).await
    }

    async fn save_document(&self, document: &Document) -> Result<()> {
        self.save_document_impl(document).await
    }

    async fn latest_document(&self, user_id: &str, session_id: &str) -> Result<Option<Document>> {
        self.latest_document_impl(user_id, session_id).await
    }

    async fn link_episode_to_document(
        &self,
        episode_uuid: Uuid,
        document_uuid: Uuid,
        chunk_index: usize,
    ) -> Result<()> {
        self.link_episode_to_document_impl(episode_uuid, document_uuid, chunk_index)
            .await
    }

    async fn document_statements(&self, document_uuid: Uuid) -> Result<Vec<Statement>> {
        self.document_statements_impl(document_uuid).await
    }

    async fn document_chunk_statements(
        &self,
        document_uuid: Uuid,
        chunk_indices: &[usize],
    ) -> Result<Vec<Statement>> {
        self.document_chunk_statements_impl(document_uuid, chunk_indices)
            .await
    }

    async fn find_similar_entities(
        &self,
        query: &SimilarEntityQuery,
    ) -> Result<Vec<ScoredEntity>> {
        self.find_similar_entities_impl(query).await
    }

    async fn find_exact_predicate_matches(
        &self,
        predicate_name: &str,
        user_id: &str,
    ) -> Result<Vec<Entity>> {
        self.find_exact_predicate_matches_impl(predicate_name, user_id)
            .await
    }

    async fn find_contradictory_statements(
        &self,
        subject_id: Uuid,
        predicate_id: Uuid,
        user_id: &str,
    ) -> Result<Vec<Statement>> {
        self.find_contradictory_statements_impl(subject_id, predicate_id, user_id)
            .await
    }

    async fn find_statements_with_same_subject_object(
        &self,
        subject_id: Uuid,
        object_id: Uuid,
        exclude_predicate_id: Option<Uuid>,
        user_id: &str,
    ) -> Result<Vec<Statement>> {
        self.find_statements_with_same_subject_object_impl(
            subject_id,
            object_id,
            exclude_predicate_id,
            user_id,
        )
        .await
    }

    async fn find_similar_statements(
        &self,
        query: &SimilarStatementQuery,
    ) -> Result<Vec<ScoredStatement>> {
        self.find_similar_statements_impl(query).await
    }

    async fn get_triple_for_statement(
        &self,
        statement_id: Uuid,
    ) -> Result<Option<StatementTriple>> {
        self.get_triple_for_statement_impl(statement_id).await
    }

    async fn search_statements_by_embedding(
        &self,
        embedding: &[f32],
        user_id: &str,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ScoredStatement>> {
        self.search_statements_by_embedding_impl(embedding, user_id, threshold, limit)
            .await
    }

    async fn search_episodes_by_embedding(
        &self,
        embedding: &[f32],
        user_id: &str,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ScoredEpisode>> {
        self.search_episodes_by_embedding_impl(embedding, user_id, threshold, limit)
            .await
    }

    async fn search_statements_by_text(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Statement>> {
        self.search_statements_by_text_impl(query, user_id, limit).await
    }

    async fn search_entities_by_name(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Entity>> {
        self.search_entities_by_name_impl(query, user_id, limit).await
    }

    async fn get_episode_statements(&self, episode_uuid: Uuid) -> Result<Vec<Statement>> {
        self.get_episode_statements_impl(episode_uuid).await
    }

    async fn get_recent_episodes(&self, query: &RecentEpisodesQuery) -> Result<Vec<Episode>> {
        self.get_recent_episodes_impl(query).await
    }

    async fn invalidate_statements(
        &self,
        statement_ids: &[Uuid],
        invalidated_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<usize> {
        self.invalidate_statements_impl(statement_ids, invalidated_by, at)
            .await
    }

    async fn valid_statements(&self, user_id: &str) -> Result<Vec<Statement>> {
        self.valid_statements_impl(user_id).await
    }

    async fn unclustered_valid_statements(&self, user_id: &str) -> Result<Vec<Statement>> {
        self.unclustered_valid_statements_impl(user_id).await
    }

    async fn valid_statement_entity_pairs(&self, user_id: &str) -> Result<Vec<(Uuid, Uuid)>> {
        self.valid_statement_entity_pairs_impl(user_id).await
    }

    async fn merge_similarity_edges(
        &self,
        user_id: &str,
        edges: &[SimilarityEdge],
    ) -> Result<()> {
        self.merge_similarity_edges_impl(user_id, edges).await
    }

    async fn similarity_edges(&self, user_id: &str) -> Result<Vec<SimilarityEdge>> {
        self.similarity_edges_impl(user_id).await
    }

    async fn drop_similarity_edges(&self, user_id: &str) -> Result<()> {
        self.drop_similarity_edges_impl(user_id).await
    }

    async fn assign_cluster(&self, statement_ids: &[Uuid], cluster_id: Uuid) -> Result<()> {
        self.assign_cluster_impl(statement_ids, cluster_id).await
    }

    async fn clear_cluster_assignments(&self, user_id: &str) -> Result<()> {
        self.clear_cluster_assignments_impl(user_id).await
    }

    async fn save_cluster(&self, cluster: &Cluster) -> Result<()> {
        self.save_cluster_impl(cluster).await
    }

    async fn get_cluster(&self, cluster_id: Uuid) -> Result<Option<Cluster>> {
        self.get_cluster_impl(cluster_id).await
    }

    async fn get_clusters(&self, user_id: &str) -> Result<Vec<Cluster>> {
        self.get_clusters_impl(user_id).await
    }

    async fn delete_clusters(&self, user_id: &str) -> Result<()> {
        self.delete_clusters_impl(user_id).await
    }

    async fn cluster_members(&self, cluster_id: Uuid) -> Result<Vec<Statement>> {
        self.cluster_members_impl(cluster_id).await
    }

    async fn record_cluster_split(
        &self,
        from_cluster: Uuid,
        to_cluster: Uuid,
        split: &ClusterSplit,
    ) -> Result<()> {
        self.record_cluster_split_impl(from_cluster, to_cluster, split)
            .await
    }

    async fn cluster_splits(&self, from_cluster: Uuid) -> Result<Vec<(Uuid, ClusterSplit)>> {
        self.cluster_splits_impl(from_cluster).await
    }

    async fn add_statements_to_space(
        &self,
        statement_ids: &[Uuid],
        space_id: Uuid,
        method: AssignmentMethod,
    ) -> Result<()> {
        self.add_statements_to_space_impl(statement_ids, space_id, method)
            .await
    }

    async fn remove_statements_from_space(
        &self,
        statement_ids: &[Uuid],
        space_id: Uuid,
    ) -> Result<()> {
        self.remove_statements_from_space_impl(statement_ids, space_id)
            .await
    }

    async fn scrub_space(&self, user_id: &str, space_id: Uuid) -> Result<usize> {
        self.scrub_space_impl(user_id, space_id).await
    }

    async fn get_space_statements(
        &self,
        user_id: &str,
        space_id: Uuid,
    ) -> Result<Vec<Statement>> {
        self.get_space_statements_impl(user_id, space_id).await
    }

    async fn statement_count(&self, user_id: &str) -> Result<u64> {
        self.statement_count_impl(user_id).await
    }
}
