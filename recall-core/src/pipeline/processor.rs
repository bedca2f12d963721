//! Job processor: dispatches queue jobs to the episode pipeline or the
//! document ingester, then kicks off out-of-band maintenance (clustering and
//! space analysis) that is allowed to lag behind the write path.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{instrument, warn};

use super::IngestionPipeline;
use crate::clustering::ClusteringEngine;
use crate::document::DocumentIngester;
use crate::error::Result;
use crate::queue::JobProcessor;
use crate::spaces::SpaceService;
use crate::types::{EpisodeType, IngestJob};

/// Default processor wired into the per-user queue
pub struct IngestProcessor {
    pipeline: Arc<IngestionPipeline>,
    documents: Arc<DocumentIngester>,
    clustering: Option<Arc<ClusteringEngine>>,
    spaces: Option<Arc<SpaceService>>,
}

impl IngestProcessor {
    pub fn new(pipeline: Arc<IngestionPipeline>, documents: Arc<DocumentIngester>) -> Self {
        Self {
            pipeline,
            documents,
            clustering: None,
            spaces: None,
        }
    }

    /// Enable out-of-band incremental clustering after successful ingests
    #[must_use]
    pub fn with_clustering(mut self, clustering: Arc<ClusteringEngine>) -> Self {
        self.clustering = Some(clustering);
        self
    }

    /// Enable the space pattern trigger after successful ingests
    #[must_use]
    pub fn with_spaces(mut self, spaces: Arc<SpaceService>) -> Self {
        self.spaces = Some(spaces);
        self
    }

    /// Fire-and-forget maintenance; failures are logged, never propagated
    fn spawn_maintenance(&self, job: &IngestJob, statements_created: usize) {
        if statements_created == 0 {
            return;
        }
        if let Some(clustering) = &self.clustering {
            let clustering = Arc::clone(clustering);
            let user_id = job.user_id.clone();
            tokio::spawn(async move {
                if let Err(e) = clustering.perform_clustering(&user_id, false).await {
                    warn!(user_id = %user_id, error = %e, "Background clustering failed");
                }
            });
        }
        if let Some(spaces) = &self.spaces {
            let spaces = Arc::clone(spaces);
            let user_id = job.user_id.clone();
            let workspace_id = job.workspace_id.clone();
            tokio::spawn(async move {
                if let Err(e) = spaces.run_triggered_analysis(&user_id, &workspace_id).await {
                    warn!(user_id = %user_id, error = %e, "Background space analysis failed");
                }
            });
        }
    }
}

#[async_trait]
impl JobProcessor for IngestProcessor {
    #[instrument(skip_all, fields(entry_id = %job.queue_id, user_id = %job.user_id))]
    async fn process(&self, job: &IngestJob) -> Result<Value> {
        let (output, statements_created) = match job.request.effective_type() {
            EpisodeType::Conversation => {
                let outcome = self.pipeline.run(&job.user_id, &job.request).await?;
                let created = outcome.statements_created;
                (serde_json::to_value(outcome)?, created)
            }
            EpisodeType::Document => {
                let outcome = self.documents.ingest(&job.user_id, &job.request).await?;
                let created = outcome.statements_created;
                (serde_json::to_value(outcome)?, created)
            }
        };

        self.spawn_maintenance(job, statements_created);
        Ok(output)
    }
}
