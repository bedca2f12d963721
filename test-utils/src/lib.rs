//! # Test Utilities
//!
//! Shared fakes for the recall test suites:
//! - [`StubEmbeddings`]: deterministic vectors, with explicit registration
//!   for tests that need controlled similarity
//! - [`ScriptedModel`]: a language model replaying canned envelope
//!   responses while recording every call
//! - request/job factory helpers

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, VecDeque};

use recall_core::embeddings::EmbeddingProvider;
use recall_core::llm::{Complexity, Generation, LanguageModel, Message};
use recall_core::types::{EpisodeType, IngestRequest};
use recall_core::{Error, Result};

/// Deterministic embedding provider.
///
/// Unregistered texts hash to a stable pseudo-random unit vector, so equal
/// texts are always identical and distinct texts are almost surely
/// dissimilar. Tests that need specific similarity relationships register
/// vectors explicitly.
pub struct StubEmbeddings {
    dimension: usize,
    registered: RwLock<HashMap<String, Vec<f32>>>,
}

impl StubEmbeddings {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            registered: RwLock::new(HashMap::new()),
        }
    }

    /// Register the exact vector a text should embed to
    pub fn register(&self, text: impl Into<String>, embedding: Vec<f32>) {
        self.registered.write().insert(text.into(), embedding);
    }

    fn hash_vector(&self, text: &str) -> Vec<f32> {
        let mut vector = Vec::with_capacity(self.dimension);
        let mut counter = 0u32;
        while vector.len() < self.dimension {
            let digest = Sha256::digest(format!("{text}#{counter}").as_bytes());
            for chunk in digest.chunks(4) {
                if vector.len() == self.dimension {
                    break;
                }
                let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                vector.push((raw as f32 / u32::MAX as f32) * 2.0 - 1.0);
            }
            counter += 1;
        }
        recall_core::embeddings::normalize(vector)
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbeddings {
    async fn embed_text(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        if let Some(registered) = self.registered.read().get(text) {
            return Ok(registered.clone());
        }
        Ok(self.hash_vector(text))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "stub-embeddings"
    }
}

/// One recorded language model call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub complexity: Complexity,
}

/// One queued response: fixed text, or a function of the prompt (for
/// verdicts that must echo uuids the pipeline generated at runtime)
enum CannedResponse {
    Text(String),
    Dynamic(Box<dyn Fn(&[Message]) -> String + Send + Sync>),
}

/// Language model replaying a queue of canned responses.
///
/// Responses pop in FIFO order; running dry is a test bug and errors
/// loudly. Every call is recorded for assertions on prompts and tiers.
#[derive(Default)]
pub struct ScriptedModel {
    responses: RwLock<VecDeque<CannedResponse>>,
    calls: RwLock<Vec<RecordedCall>>,
}

impl ScriptedModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one raw response (envelope included, if the stage expects one)
    pub fn push_response(&self, text: impl Into<String>) {
        self.responses
            .write()
            .push_back(CannedResponse::Text(text.into()));
    }

    /// Queue a response wrapped in `<output>` tags
    pub fn push_output(&self, payload: impl std::fmt::Display) {
        self.push_response(format!("<output>{payload}</output>"));
    }

    /// Queue a response computed from the incoming prompt
    pub fn push_dynamic(
        &self,
        responder: impl Fn(&[Message]) -> String + Send + Sync + 'static,
    ) {
        self.responses
            .write()
            .push_back(CannedResponse::Dynamic(Box::new(responder)));
    }

    /// All calls made so far
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().clone()
    }

    /// Number of calls made so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.read().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, messages: &[Message], complexity: Complexity) -> Result<Generation> {
        self.calls.write().push(RecordedCall {
            messages: messages.to_vec(),
            complexity,
        });
        let canned = self
            .responses
            .write()
            .pop_front()
            .ok_or_else(|| Error::Llm("ScriptedModel ran out of canned responses".into()))?;
        let text = match canned {
            CannedResponse::Text(text) => text,
            CannedResponse::Dynamic(responder) => responder(messages),
        };

        let input_tokens: u64 = messages
            .iter()
            .map(|m| m.content.len() as u64 / 4)
            .sum();
        Ok(Generation {
            output_tokens: text.len() as u64 / 4,
            input_tokens,
            text,
        })
    }
}

/// Build a chat ingest request with the user id stamped into metadata the
/// way the API layer does it
#[must_use]
pub fn chat_request(body: &str, user_id: &str, reference_time: DateTime<Utc>) -> IngestRequest {
    let mut metadata = BTreeMap::new();
    metadata.insert(
        "userId".to_string(),
        serde_json::Value::String(user_id.to_string()),
    );
    IngestRequest {
        episode_body: body.to_string(),
        reference_time,
        metadata,
        source: "chat".to_string(),
        space_id: None,
        session_id: None,
        name: None,
        episode_type: None,
    }
}

/// Build a document ingest request
#[must_use]
pub fn document_request(
    body: &str,
    user_id: &str,
    session_id: &str,
    reference_time: DateTime<Utc>,
) -> IngestRequest {
    let mut request = chat_request(body, user_id, reference_time);
    request.source = "upload".to_string();
    request.session_id = Some(session_id.to_string());
    request.name = Some(session_id.to_string());
    request.episode_type = Some(EpisodeType::Document);
    request
}

/// Envelope payload for an entity-extraction response
#[must_use]
pub fn entities_output(names: &[&str]) -> String {
    format!(
        "<output>{}</output>",
        serde_json::to_string(names).unwrap_or_default()
    )
}

/// Envelope payload for a statement-extraction response
#[must_use]
pub fn triples_output(triples: &[(&str, &str, &str, &str)]) -> String {
    let array: Vec<serde_json::Value> = triples
        .iter()
        .map(|(source, predicate, target, fact)| {
            serde_json::json!({
                "source": source,
                "predicate": predicate,
                "target": target,
                "fact": fact,
            })
        })
        .collect();
    format!(
        "<output>{}</output>",
        serde_json::to_string(&array).unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::embeddings::cosine_similarity;

    #[tokio::test]
    async fn stub_embeddings_are_deterministic() {
        let stub = StubEmbeddings::new(8);
        let a = stub.embed_text("hello").await.unwrap();
        let b = stub.embed_text("hello").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);

        let c = stub.embed_text("different").await.unwrap();
        assert!(cosine_similarity(&a, &c) < 0.99);
    }

    #[tokio::test]
    async fn registered_vectors_win() {
        let stub = StubEmbeddings::new(3);
        stub.register("pinned", vec![1.0, 0.0, 0.0]);
        assert_eq!(stub.embed_text("pinned").await.unwrap(), vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn scripted_model_replays_in_order() {
        let model = ScriptedModel::new();
        model.push_output("first");
        model.push_output("second");

        let messages = vec![Message::user("hi")];
        let first = model.generate(&messages, Complexity::High).await.unwrap();
        assert!(first.text.contains("first"));
        let second = model.generate(&messages, Complexity::Low).await.unwrap();
        assert!(second.text.contains("second"));

        assert!(model.generate(&messages, Complexity::Low).await.is_err());
        assert_eq!(model.call_count(), 3);
        assert_eq!(model.calls()[1].complexity, Complexity::Low);
    }
}
