//! Server binary: wire config, stores, providers, queue, and the router.

use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use recall_core::clustering::ClusteringEngine;
use recall_core::document::DocumentIngester;
use recall_core::embeddings::{EmbeddingProvider, RemoteEmbeddingProvider};
use recall_core::graph::{GraphStore, JobStore, SpaceStore};
use recall_core::llm::{LanguageModel, RemoteLanguageModel};
use recall_core::pipeline::{IngestProcessor, IngestionPipeline};
use recall_core::queue::IngestQueue;
use recall_core::spaces::SpaceService;
use recall_core::types::{ClusteringConfig, QueueConfig, RecallConfig};
use recall_core::{Error, Result};
use recall_server::{router, AppState};
use recall_storage_turso::TursoGraphStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = RecallConfig::from_env()?;

    // Graph driver is the process-wide singleton; everything borrows it
    let store = Arc::new(TursoGraphStore::new(&config.graph_url, &config.graph_auth_token).await?);
    if !store.initialize_schema().await {
        warn!("Schema initialization reported failure; continuing on existing schema");
    }

    let api_key = config
        .llm_api_key
        .clone()
        .ok_or_else(|| Error::Configuration("LLM_API_KEY is required".into()))?;
    let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(match &config.llm_base_url {
        Some(base_url) => RemoteEmbeddingProvider::with_base_url(
            api_key.clone(),
            config.embedding_model.clone(),
            config.embedding_dimension,
            base_url.clone(),
        )
        .map_err(Error::Embedding)?,
        None => RemoteEmbeddingProvider::new(
            api_key.clone(),
            config.embedding_model.clone(),
            config.embedding_dimension,
        )
        .map_err(Error::Embedding)?,
    });
    let model: Arc<dyn LanguageModel> = Arc::new(match &config.llm_base_url {
        Some(base_url) => RemoteLanguageModel::with_base_url(
            api_key.clone(),
            config.model_high.clone(),
            config.model_low.clone(),
            base_url.clone(),
        )?,
        None => RemoteLanguageModel::new(
            api_key,
            config.model_high.clone(),
            config.model_low.clone(),
        )?,
    });

    let graph: Arc<dyn GraphStore> = store.clone();
    let jobs: Arc<dyn JobStore> = store.clone();
    let space_store: Arc<dyn SpaceStore> = store.clone();

    let pipeline = Arc::new(IngestionPipeline::new(
        graph.clone(),
        embeddings.clone(),
        model.clone(),
    ));
    let documents = Arc::new(DocumentIngester::new(
        graph.clone(),
        embeddings.clone(),
        pipeline.clone(),
    ));
    let clustering = Arc::new(ClusteringEngine::new(
        graph.clone(),
        model.clone(),
        ClusteringConfig::default(),
    ));
    let spaces = Arc::new(SpaceService::new(
        graph.clone(),
        space_store,
        model.clone(),
    ));

    let processor = Arc::new(
        IngestProcessor::new(pipeline, documents)
            .with_clustering(clustering)
            .with_spaces(spaces.clone()),
    );
    let queue = Arc::new(IngestQueue::new(QueueConfig::default(), processor, jobs.clone()));

    // Jobs that never ran before the last shutdown go back on the wire
    let recovered = queue.recover_pending().await?;
    if recovered > 0 {
        info!(recovered, "Recovered pending ingestion jobs");
    }

    let state = AppState {
        queue: queue.clone(),
        jobs,
        spaces,
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "recall server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            queue.shutdown();
        })
        .await
        .map_err(|e| Error::Configuration(format!("server error: {e}")))?;

    Ok(())
}
