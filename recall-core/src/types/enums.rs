use serde::{Deserialize, Serialize};

// ============================================================================
// Enums
// ============================================================================

/// Kind of source content behind an episode.
///
/// Determines which normalization prompt variant the pipeline uses and
/// whether the document differ is involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EpisodeType {
    /// Chat messages and short free-form text
    Conversation,
    /// Document chunks produced by the semantic chunker
    Document,
}

impl std::fmt::Display for EpisodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EpisodeType::Conversation => write!(f, "CONVERSATION"),
            EpisodeType::Document => write!(f, "DOCUMENT"),
        }
    }
}

impl std::str::FromStr for EpisodeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "CONVERSATION" => Ok(EpisodeType::Conversation),
            "DOCUMENT" => Ok(EpisodeType::Document),
            other => Err(format!("unknown episode type: {other}")),
        }
    }
}

/// Lifecycle of an ingestion job.
///
/// Transitions are `Pending → Processing → (Completed | Failed)` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Entry created, job not yet picked up by a worker
    Pending,
    /// A per-user worker is running the pipeline
    Processing,
    /// Pipeline finished; `output` carries the result
    Completed,
    /// Pipeline aborted; `error` carries the reason
    Failed,
}

impl JobStatus {
    /// Whether `next` is a legal transition from this status
    #[must_use]
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed | JobStatus::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Thematic angle a cluster captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectType {
    /// Topic-driven grouping (default)
    Thematic,
    /// People and relationships
    Social,
    /// Actions and habits
    Activity,
}

impl std::fmt::Display for AspectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AspectType::Thematic => "thematic",
            AspectType::Social => "social",
            AspectType::Activity => "activity",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AspectType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "thematic" => Ok(AspectType::Thematic),
            "social" => Ok(AspectType::Social),
            "activity" => Ok(AspectType::Activity),
            other => Err(format!("unknown aspect type: {other}")),
        }
    }
}

/// How a statement ended up in a space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentMethod {
    /// Explicit user action through the API
    Manual,
    /// Background LLM pattern analysis
    Llm,
}

impl std::fmt::Display for AssignmentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignmentMethod::Manual => write!(f, "manual"),
            AssignmentMethod::Llm => write!(f, "llm"),
        }
    }
}
