//! Remote embedding provider for an OpenAI-compatible embeddings API.
//!
//! Gated behind the `remote-providers` feature; tests and the pipeline only
//! ever see the [`EmbeddingProvider`](super::EmbeddingProvider) trait.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::provider::{validate_dimension, EmbeddingProvider};

/// Embedding provider backed by an OpenAI-compatible `/embeddings` endpoint
pub struct RemoteEmbeddingProvider {
    api_key: String,
    model: String,
    dimension: usize,
    client: reqwest::Client,
    base_url: String,
}

impl RemoteEmbeddingProvider {
    /// Create a provider against the default OpenAI endpoint
    pub fn new(api_key: String, model: String, dimension: usize) -> Result<Self> {
        Self::with_base_url(api_key, model, dimension, "https://api.openai.com/v1".into())
    }

    /// Create a provider against a custom endpoint (Azure, OSS gateways)
    pub fn with_base_url(
        api_key: String,
        model: String,
        dimension: usize,
        base_url: String,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            model,
            dimension,
            client,
            base_url,
        })
    }

    async fn request_embeddings(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingRequest {
            input,
            model: self.model.clone(),
            encoding_format: "float",
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .context("Failed to send embedding request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding API error {}: {}", status, error_text);
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse embedding response")?;

        let mut data = parsed.data;
        // The API does not guarantee order; indexes do
        data.sort_by_key(|d| d.index);
        let embeddings: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();
        for embedding in &embeddings {
            validate_dimension(embedding, self.dimension)?;
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbeddingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.request_embeddings(vec![text.to_string()]).await?;
        embeddings
            .pop()
            .context("Embedding API returned no vectors")
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request_embeddings(texts.to_vec()).await
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct EmbeddingRequest {
    input: Vec<String>,
    model: String,
    encoding_format: &'static str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}
