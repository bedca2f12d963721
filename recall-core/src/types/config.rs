// ============================================================================
// Configuration
// ============================================================================

use crate::error::{Error, Result};

/// Process-wide configuration resolved from the environment.
///
/// Components receive the slice of config they need at construction time;
/// nothing reads the environment after startup.
#[derive(Debug, Clone)]
pub struct RecallConfig {
    /// Graph database URL (`libsql://…`, `file:…`, or `:memory:`)
    pub graph_url: String,
    /// Auth token for remote graph databases
    pub graph_auth_token: String,
    /// Embedding vector dimension D
    pub embedding_dimension: usize,
    /// Embedding model identifier handed to the provider
    pub embedding_model: String,
    /// Model routed to for high-complexity generations
    pub model_high: String,
    /// Model routed to for low-complexity generations
    pub model_low: String,
    /// API key for remote LLM/embedding providers
    pub llm_api_key: Option<String>,
    /// Optional base URL of an OSS OpenAI-compatible endpoint
    pub llm_base_url: Option<String>,
    /// HTTP bind address for the server
    pub bind_addr: String,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            graph_url: ":memory:".to_string(),
            graph_auth_token: String::new(),
            embedding_dimension: 1536,
            embedding_model: "text-embedding-3-small".to_string(),
            model_high: "gpt-4.1".to_string(),
            model_low: "gpt-4.1-mini".to_string(),
            llm_api_key: None,
            llm_base_url: None,
            bind_addr: "127.0.0.1:3033".to_string(),
        }
    }
}

impl RecallConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for everything except values that make no sense to default in
    /// production (none currently; the in-memory graph default keeps local
    /// development and tests zero-config).
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let embedding_dimension = match std::env::var("EMBEDDING_MODEL_SIZE") {
            Ok(raw) => raw.parse::<usize>().map_err(|_| {
                Error::Configuration(format!("EMBEDDING_MODEL_SIZE is not a number: {raw}"))
            })?,
            Err(_) => defaults.embedding_dimension,
        };
        if embedding_dimension == 0 {
            return Err(Error::Configuration(
                "EMBEDDING_MODEL_SIZE must be positive".to_string(),
            ));
        }

        Ok(Self {
            graph_url: env_or("GRAPH_URL", &defaults.graph_url),
            graph_auth_token: env_or("GRAPH_AUTH_TOKEN", &defaults.graph_auth_token),
            embedding_dimension,
            embedding_model: env_or("EMBEDDING_MODEL", &defaults.embedding_model),
            model_high: env_or("MODEL_HIGH", &defaults.model_high),
            model_low: env_or("MODEL_LOW", &defaults.model_low),
            llm_api_key: std::env::var("LLM_API_KEY").ok(),
            llm_base_url: std::env::var("LLM_BASE_URL").ok(),
            bind_addr: env_or("BIND_ADDR", &defaults.bind_addr),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Tuning for the per-user ingestion queue
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Buffered jobs per user channel before enqueue backpressures
    pub channel_capacity: usize,
    /// Idle time after which a user worker parks itself
    pub worker_idle_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            worker_idle_timeout_secs: 300,
        }
    }
}

/// Tuning for the clustering engine
#[derive(Debug, Clone)]
pub struct ClusteringConfig {
    /// Smallest community that survives finalisation
    pub min_cluster_size: usize,
    /// CPM resolution parameter
    pub gamma: f64,
    /// Maximum aggregation levels per Leiden run
    pub max_levels: usize,
    /// Convergence tolerance on quality gain
    pub tolerance: f64,
    /// Mean member-to-centroid similarity below which a cluster has drifted
    pub cohesion_threshold: f32,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: crate::constants::MIN_CLUSTER_SIZE,
            gamma: crate::constants::LEIDEN_GAMMA,
            max_levels: crate::constants::LEIDEN_MAX_LEVELS,
            tolerance: crate::constants::LEIDEN_TOLERANCE,
            cohesion_threshold: crate::constants::COHESION_THRESHOLD,
        }
    }
}
