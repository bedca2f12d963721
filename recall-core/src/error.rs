use uuid::Uuid;

/// Result type alias for recall operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the knowledge graph memory system
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Model output parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Embedding error: {0}")]
    Embedding(#[from] anyhow::Error),

    #[error("Language model error: {0}")]
    Llm(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Schema initialization failed: {0}")]
    SchemaInit(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is recoverable (can retry with backoff)
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Transport and store failures may clear on retry
            Error::Storage(_) | Error::Queue(_) | Error::Embedding(_) | Error::Llm(_)
            | Error::Io(_) => true,
            // Everything else is a logic or input problem
            Error::Validation(_)
            | Error::NotFound(_)
            | Error::InvalidState(_)
            | Error::Parse(_)
            | Error::Serialization(_)
            | Error::Cancelled
            | Error::SchemaInit(_)
            | Error::Configuration(_) => false,
        }
    }

    /// Check if this error was caused by job cancellation
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_are_recoverable() {
        assert!(Error::Storage("connection reset".into()).is_recoverable());
        assert!(Error::Llm("rate limited".into()).is_recoverable());
    }

    #[test]
    fn parse_and_validation_errors_are_not_recoverable() {
        assert!(!Error::Parse("no <output> block".into()).is_recoverable());
        assert!(!Error::Validation("episodeBody is required".into()).is_recoverable());
        assert!(!Error::Cancelled.is_recoverable());
    }

    #[test]
    fn cancellation_is_detectable() {
        assert!(Error::Cancelled.is_cancellation());
        assert!(!Error::Queue("full".into()).is_cancellation());
    }

    #[test]
    fn serde_errors_convert() {
        let bad = serde_json::from_str::<serde_json::Value>("{");
        let err: Error = bad.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
