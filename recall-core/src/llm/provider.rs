//! Language model trait: message sequences in, tagged text plus token counts out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Message role in a prompt sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a prompt sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Build a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Build a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Build an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Complexity tier used to route a generation to a configured model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// Hard synthesis: normalization, cluster naming
    High,
    /// Structured adjudication: dedup verdicts, resolution verdicts
    Low,
}

/// Raw generation result: the model's text plus token accounting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// Full response text; payload is wrapped in `<output>…</output>` tags
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Generation {
    /// Total tokens billed for this call
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Trait for language model adapters.
///
/// Implementations route each call to the model configured for its
/// complexity tier and always report token counts. Returning the raw text
/// (envelope included) is deliberate: parsing is the caller's concern, and
/// parse fallbacks differ per pipeline stage.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run one generation over the message sequence
    async fn generate(&self, messages: &[Message], complexity: Complexity) -> Result<Generation>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors_set_roles() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").role, Role::User);
        assert_eq!(Message::assistant("a").role, Role::Assistant);
    }

    #[test]
    fn generation_totals_tokens() {
        let g = Generation {
            text: String::new(),
            input_tokens: 120,
            output_tokens: 34,
        };
        assert_eq!(g.total_tokens(), 154);
    }
}
