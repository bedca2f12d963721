//! Embedding provider trait and common functionality

use anyhow::Result;
use async_trait::async_trait;

/// Trait for embedding providers that convert text to vectors.
///
/// The pipeline treats embedding as a pure effect: text in, fixed-dimension
/// vector out. Batch calls preserve input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts in batch.
    ///
    /// More efficient than calling `embed_text` multiple times.
    /// Default implementation calls `embed_text` for each text.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_text(text).await?);
        }
        Ok(embeddings)
    }

    /// Get the embedding dimension for this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;
}

/// Validate embedding dimension matches expected
pub fn validate_dimension(embedding: &[f32], expected: usize) -> Result<()> {
    if embedding.len() != expected {
        anyhow::bail!(
            "Embedding dimension mismatch: got {}, expected {}",
            embedding.len(),
            expected
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider;

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }

        fn embedding_dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn default_batch_preserves_order() {
        let provider = FixedProvider;
        let out = provider
            .embed_batch(&["a".to_string(), "abc".to_string()])
            .await
            .unwrap();
        assert_eq!(out[0][0], 1.0);
        assert_eq!(out[1][0], 3.0);
    }

    #[test]
    fn dimension_validation() {
        assert!(validate_dimension(&[1.0, 2.0], 2).is_ok());
        assert!(validate_dimension(&[1.0, 2.0], 3).is_err());
    }
}
