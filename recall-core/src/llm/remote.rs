//! Remote language model adapter for an OpenAI-compatible chat API.
//!
//! Gated behind the `remote-providers` feature.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::provider::{Complexity, Generation, LanguageModel, Message};
use crate::error::{Error, Result};

/// Chat adapter routing complexity tiers to configured model names
pub struct RemoteLanguageModel {
    api_key: String,
    model_high: String,
    model_low: String,
    client: reqwest::Client,
    base_url: String,
}

impl RemoteLanguageModel {
    /// Create an adapter against the default OpenAI endpoint
    pub fn new(api_key: String, model_high: String, model_low: String) -> Result<Self> {
        Self::with_base_url(
            api_key,
            model_high,
            model_low,
            "https://api.openai.com/v1".into(),
        )
    }

    /// Create an adapter against a custom endpoint
    pub fn with_base_url(
        api_key: String,
        model_high: String,
        model_low: String,
        base_url: String,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")
            .map_err(Error::Embedding)?;

        Ok(Self {
            api_key,
            model_high,
            model_low,
            client,
            base_url,
        })
    }

    fn model_for(&self, complexity: Complexity) -> &str {
        match complexity {
            Complexity::High => &self.model_high,
            Complexity::Low => &self.model_low,
        }
    }
}

#[async_trait]
impl LanguageModel for RemoteLanguageModel {
    async fn generate(&self, messages: &[Message], complexity: Complexity) -> Result<Generation> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: self.model_for(complexity).to_string(),
            messages: messages.to_vec(),
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Llm(format!("chat request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("chat API error {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Llm(format!("invalid chat response: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Llm("chat response carried no choices".into()))?;

        Ok(Generation {
            text,
            input_tokens: parsed.usage.prompt_tokens,
            output_tokens: parsed.usage.completion_tokens,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: ChatUsage,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
