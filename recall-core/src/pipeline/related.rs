//! Related-memory retrieval: semantically close episodes and statements
//! pulled into the normalization context.

use std::sync::Arc;
use tracing::instrument;

use crate::constants::{
    RELATED_EPISODE_LIMIT, RELATED_MEMORY_THRESHOLD, RELATED_STATEMENT_LIMIT,
};
use crate::embeddings::EmbeddingProvider;
use crate::error::Result;
use crate::graph::GraphStore;

/// Labelled fragment of memories related to an incoming episode body
#[derive(Debug, Clone, Default)]
pub struct RelatedMemories {
    /// Markdown fragment for the normalization prompt; `None` when nothing
    /// cleared the similarity threshold
    pub markdown: Option<String>,
}

/// Embed the raw body once and gather nearby episodes and statements
#[instrument(skip_all, fields(user_id = %user_id))]
pub async fn retrieve(
    graph: &Arc<dyn GraphStore>,
    embeddings: &Arc<dyn EmbeddingProvider>,
    body: &str,
    user_id: &str,
) -> Result<RelatedMemories> {
    let embedding = embeddings.embed_text(body).await?;

    let episodes = graph
        .search_episodes_by_embedding(
            &embedding,
            user_id,
            RELATED_MEMORY_THRESHOLD,
            RELATED_EPISODE_LIMIT,
        )
        .await?;
    let statements = graph
        .search_statements_by_embedding(
            &embedding,
            user_id,
            RELATED_MEMORY_THRESHOLD,
            RELATED_STATEMENT_LIMIT,
        )
        .await?;

    if episodes.is_empty() && statements.is_empty() {
        return Ok(RelatedMemories::default());
    }

    let mut markdown = String::new();
    if !episodes.is_empty() {
        markdown.push_str("### Related episodes\n");
        for scored in &episodes {
            markdown.push_str(&format!(
                "- ({}) {}\n",
                scored.episode.valid_at.format("%Y-%m-%d"),
                scored.episode.content
            ));
        }
    }
    if !statements.is_empty() {
        if !markdown.is_empty() {
            markdown.push('\n');
        }
        markdown.push_str("### Related facts\n");
        for scored in &statements {
            markdown.push_str(&format!("- {}\n", scored.statement.fact));
        }
    }

    Ok(RelatedMemories {
        markdown: Some(markdown),
    })
}
