//! # Per-User Ingestion Queue
//!
//! Keyed logical queues `ingest-user-<userId>`: one lazily spawned worker per
//! user with channel capacity bounded by [`QueueConfig`], giving FIFO
//! delivery and at most one in-flight job per user while unrelated users
//! proceed in parallel.
//!
//! Durability lives in the relational [`JobStore`]: the entry is created
//! `PENDING` *before* the job enters a channel, so a restart can re-enqueue
//! whatever never ran. Workers are cancellation-aware; a job caught by
//! shutdown finalizes its entry as `FAILED("cancelled")`.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::graph::JobStore;
use crate::types::{IngestJob, IngestRequest, IngestionQueueEntry, QueueConfig};

/// Processes one job end to end, returning the JSON output recorded on the
/// queue entry. Implemented by the ingestion pipeline dispatcher.
#[async_trait]
pub trait JobProcessor: Send + Sync + 'static {
    async fn process(&self, job: &IngestJob) -> Result<Value>;
}

/// Statistics about queue operations
#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub total_enqueued: u64,
    pub total_processed: u64,
    pub total_failed: u64,
    /// Users with a live worker right now
    pub active_workers: usize,
}

/// Per-user ingestion queue
pub struct IngestQueue {
    config: QueueConfig,
    processor: Arc<dyn JobProcessor>,
    jobs: Arc<dyn JobStore>,
    /// user id → sender of that user's worker; guarded so worker teardown
    /// and enqueue cannot race
    registry: Arc<Mutex<HashMap<String, mpsc::Sender<IngestJob>>>>,
    stats: Arc<RwLock<QueueStats>>,
    shutdown_tx: watch::Sender<bool>,
}

impl IngestQueue {
    /// Create a queue over the given processor and job store
    pub fn new(
        config: QueueConfig,
        processor: Arc<dyn JobProcessor>,
        jobs: Arc<dyn JobStore>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            processor,
            jobs,
            registry: Arc::new(Mutex::new(HashMap::new())),
            stats: Arc::new(RwLock::new(QueueStats::default())),
            shutdown_tx,
        }
    }

    /// Accept an ingest request: create the PENDING entry, then enqueue the
    /// job on the user's logical queue. Returns the entry id.
    #[instrument(skip(self, request), fields(user_id = %user_id, workspace_id = %workspace_id))]
    pub async fn submit(
        &self,
        user_id: &str,
        workspace_id: &str,
        request: IngestRequest,
    ) -> Result<Uuid> {
        request.validate()?;

        let entry = IngestionQueueEntry::pending(
            workspace_id.to_string(),
            request.space_id,
            serde_json::to_value(&request)?,
        );
        // Entry exists before the broker ever sees the job
        self.jobs.create_entry(&entry).await?;

        let job = IngestJob {
            queue_id: entry.id,
            user_id: user_id.to_string(),
            workspace_id: workspace_id.to_string(),
            space_id: request.space_id,
            request,
        };
        self.enqueue(job).await?;
        Ok(entry.id)
    }

    /// Re-enqueue every PENDING entry after a restart, in creation order.
    /// Returns the number of recovered jobs.
    pub async fn recover_pending(&self) -> Result<usize> {
        let pending = self.jobs.pending_entries().await?;
        let mut recovered = 0;
        for entry in pending {
            let request: IngestRequest = match serde_json::from_value(entry.data.clone()) {
                Ok(request) => request,
                Err(e) => {
                    warn!(entry_id = %entry.id, error = %e, "Skipping unreadable pending entry");
                    self.jobs
                        .fail(entry.id, &format!("unreadable request payload: {e}"))
                        .await?;
                    continue;
                }
            };
            // The owning user is not stored on the entry; it rides in the
            // request metadata written at submit time
            let Some(user_id) = request
                .metadata
                .get("userId")
                .and_then(|v| v.as_str())
                .map(String::from)
            else {
                self.jobs
                    .fail(entry.id, "pending entry has no userId metadata")
                    .await?;
                continue;
            };
            let job = IngestJob {
                queue_id: entry.id,
                user_id,
                workspace_id: entry.workspace_id.clone(),
                space_id: entry.space_id,
                request,
            };
            self.enqueue(job).await?;
            recovered += 1;
        }
        if recovered > 0 {
            info!(recovered, "Recovered pending ingestion jobs");
        }
        Ok(recovered)
    }

    /// Push a job onto its user's queue, spawning the worker if needed
    async fn enqueue(&self, job: IngestJob) -> Result<()> {
        let mut registry = self.registry.lock().await;
        let sender = match registry.get(&job.user_id) {
            Some(sender) => sender.clone(),
            None => {
                let sender = self.spawn_worker(&job.user_id).await;
                registry.insert(job.user_id.clone(), sender.clone());
                sender
            }
        };

        sender
            .send(job)
            .await
            .map_err(|_| Error::Queue("user worker channel closed".into()))?;

        let mut stats = self.stats.write().await;
        stats.total_enqueued += 1;
        Ok(())
    }

    /// Spawn the single consumer for one user's logical queue
    async fn spawn_worker(&self, user_id: &str) -> mpsc::Sender<IngestJob> {
        let (sender, receiver) = mpsc::channel::<IngestJob>(self.config.channel_capacity);
        let queue_name = format!("ingest-user-{user_id}");

        let worker = UserWorker {
            queue_name,
            user_id: user_id.to_string(),
            processor: Arc::clone(&self.processor),
            jobs: Arc::clone(&self.jobs),
            registry: Arc::clone(&self.registry),
            stats: Arc::clone(&self.stats),
            shutdown: self.shutdown_tx.subscribe(),
            idle_timeout: Duration::from_secs(self.config.worker_idle_timeout_secs),
        };

        {
            let mut stats = self.stats.write().await;
            stats.active_workers += 1;
        }
        tokio::spawn(worker.run(receiver));
        sender
    }

    /// Snapshot of queue statistics
    pub async fn stats(&self) -> QueueStats {
        self.stats.read().await.clone()
    }

    /// Signal every worker to stop after its current job
    pub fn shutdown(&self) {
        info!("Ingest queue shutting down");
        let _ = self.shutdown_tx.send(true);
    }
}

/// Single consumer bound to one user's queue
struct UserWorker {
    queue_name: String,
    user_id: String,
    processor: Arc<dyn JobProcessor>,
    jobs: Arc<dyn JobStore>,
    registry: Arc<Mutex<HashMap<String, mpsc::Sender<IngestJob>>>>,
    stats: Arc<RwLock<QueueStats>>,
    shutdown: watch::Receiver<bool>,
    idle_timeout: Duration,
}

impl UserWorker {
    #[instrument(skip(self, receiver), fields(queue = %self.queue_name))]
    async fn run(self, mut receiver: mpsc::Receiver<IngestJob>) {
        debug!("Worker started");
        let mut shutdown = self.shutdown.clone();
        loop {
            // Checked at the top so a job queued behind a cancelled one is
            // drained instead of processed
            if *shutdown.borrow() {
                self.drain_cancelled(&mut receiver).await;
                break;
            }

            tokio::select! {
                job = receiver.recv() => {
                    match job {
                        Some(job) => self.handle(job).await,
                        None => break,
                    }
                }
                _ = shutdown.changed() => {}
                () = tokio::time::sleep(self.idle_timeout) => {
                    // Park the worker if nothing arrived while we waited.
                    // Removal and the final emptiness check happen under the
                    // registry lock so submit() cannot slip a job past us.
                    let mut registry = self.registry.lock().await;
                    match receiver.try_recv() {
                        Ok(job) => {
                            drop(registry);
                            self.handle(job).await;
                        }
                        Err(mpsc::error::TryRecvError::Empty) => {
                            registry.remove(&self.user_id);
                            break;
                        }
                        Err(mpsc::error::TryRecvError::Disconnected) => break,
                    }
                }
            }
        }

        let mut stats = self.stats.write().await;
        stats.active_workers = stats.active_workers.saturating_sub(1);
        debug!("Worker stopped");
    }

    /// Run one job to completion, racing it against shutdown
    #[instrument(skip(self, job), fields(queue = %self.queue_name, entry_id = %job.queue_id))]
    async fn handle(&self, job: IngestJob) {
        if let Err(e) = self.jobs.mark_processing(job.queue_id).await {
            error!(error = %e, "Failed to mark entry PROCESSING; dropping job");
            return;
        }

        let mut shutdown = self.shutdown.clone();
        let outcome = tokio::select! {
            result = self.processor.process(&job) => result,
            _ = shutdown.wait_for(|stop| *stop) => Err(Error::Cancelled),
        };

        match outcome {
            Ok(output) => {
                if let Err(e) = self.jobs.complete(job.queue_id, output).await {
                    error!(error = %e, "Failed to finalize COMPLETED entry");
                }
                let mut stats = self.stats.write().await;
                stats.total_processed += 1;
            }
            Err(e) => {
                let message = if e.is_cancellation() {
                    "cancelled".to_string()
                } else {
                    e.to_string()
                };
                warn!(error = %message, "Ingestion job failed");
                if let Err(store_err) = self.jobs.fail(job.queue_id, &message).await {
                    error!(error = %store_err, "Failed to finalize FAILED entry");
                }
                let mut stats = self.stats.write().await;
                stats.total_failed += 1;
            }
        }
    }

    /// Fail everything still queued when shutdown catches this worker
    async fn drain_cancelled(&self, receiver: &mut mpsc::Receiver<IngestJob>) {
        while let Ok(job) = receiver.try_recv() {
            if let Err(e) = self.jobs.fail(job.queue_id, "cancelled").await {
                error!(entry_id = %job.queue_id, error = %e, "Failed to cancel queued entry");
            }
            let mut stats = self.stats.write().await;
            stats.total_failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::JobPage;
    use crate::types::JobStatus;
    use chrono::Utc;
    use parking_lot::RwLock as SyncRwLock;
    use std::collections::BTreeMap;

    /// In-memory JobStore recording transitions
    #[derive(Default)]
    struct TestJobs {
        entries: SyncRwLock<HashMap<Uuid, IngestionQueueEntry>>,
    }

    #[async_trait]
    impl JobStore for TestJobs {
        async fn create_entry(&self, entry: &IngestionQueueEntry) -> Result<()> {
            self.entries.write().insert(entry.id, entry.clone());
            Ok(())
        }

        async fn mark_processing(&self, id: Uuid) -> Result<()> {
            let mut entries = self.entries.write();
            let entry = entries.get_mut(&id).ok_or(Error::NotFound(id))?;
            entry.status = JobStatus::Processing;
            Ok(())
        }

        async fn complete(&self, id: Uuid, output: Value) -> Result<()> {
            let mut entries = self.entries.write();
            let entry = entries.get_mut(&id).ok_or(Error::NotFound(id))?;
            entry.status = JobStatus::Completed;
            entry.output = Some(output);
            Ok(())
        }

        async fn fail(&self, id: Uuid, error: &str) -> Result<()> {
            let mut entries = self.entries.write();
            let entry = entries.get_mut(&id).ok_or(Error::NotFound(id))?;
            entry.status = JobStatus::Failed;
            entry.error = Some(error.to_string());
            Ok(())
        }

        async fn get_entry(&self, id: Uuid) -> Result<Option<IngestionQueueEntry>> {
            Ok(self.entries.read().get(&id).cloned())
        }

        async fn list_entries(&self, workspace_id: &str, page: u64, limit: u64) -> Result<JobPage> {
            let entries: Vec<_> = self
                .entries
                .read()
                .values()
                .filter(|e| e.workspace_id == workspace_id)
                .cloned()
                .collect();
            Ok(JobPage {
                total: entries.len() as u64,
                entries,
                page,
                limit,
            })
        }

        async fn pending_entries(&self) -> Result<Vec<IngestionQueueEntry>> {
            let mut pending: Vec<_> = self
                .entries
                .read()
                .values()
                .filter(|e| e.status == JobStatus::Pending)
                .cloned()
                .collect();
            pending.sort_by_key(|e| e.created_at);
            Ok(pending)
        }
    }

    /// Processor that records per-user execution order and overlap
    struct TracingProcessor {
        log: SyncRwLock<Vec<String>>,
        in_flight: SyncRwLock<HashMap<String, usize>>,
        max_overlap: SyncRwLock<usize>,
        delay: Duration,
        fail_bodies: Vec<String>,
    }

    impl TracingProcessor {
        fn new(delay: Duration) -> Self {
            Self {
                log: SyncRwLock::new(Vec::new()),
                in_flight: SyncRwLock::new(HashMap::new()),
                max_overlap: SyncRwLock::new(0),
                delay,
                fail_bodies: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl JobProcessor for TracingProcessor {
        async fn process(&self, job: &IngestJob) -> Result<Value> {
            {
                let mut in_flight = self.in_flight.write();
                let count = in_flight.entry(job.user_id.clone()).or_insert(0);
                *count += 1;
                let mut max = self.max_overlap.write();
                *max = (*max).max(*count);
            }
            tokio::time::sleep(self.delay).await;
            self.log
                .write()
                .push(format!("{}:{}", job.user_id, job.request.episode_body));
            {
                let mut in_flight = self.in_flight.write();
                *in_flight.get_mut(&job.user_id).unwrap() -= 1;
            }
            if self.fail_bodies.contains(&job.request.episode_body) {
                return Err(Error::Storage("boom".into()));
            }
            Ok(serde_json::json!({"ok": true}))
        }
    }

    fn request(body: &str, user_id: &str) -> IngestRequest {
        let mut metadata = BTreeMap::new();
        metadata.insert("userId".to_string(), Value::String(user_id.to_string()));
        IngestRequest {
            episode_body: body.into(),
            reference_time: Utc::now(),
            metadata,
            source: "chat".into(),
            space_id: None,
            session_id: None,
            name: None,
            episode_type: None,
        }
    }

    fn queue_with(processor: Arc<TracingProcessor>) -> (IngestQueue, Arc<TestJobs>) {
        let jobs = Arc::new(TestJobs::default());
        let queue = IngestQueue::new(QueueConfig::default(), processor, jobs.clone());
        (queue, jobs)
    }

    async fn wait_until<F: Fn() -> bool>(predicate: F) {
        for _ in 0..200 {
            if predicate() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn same_user_jobs_run_fifo() {
        let processor = Arc::new(TracingProcessor::new(Duration::from_millis(20)));
        let (queue, _) = queue_with(processor.clone());

        for body in ["one", "two", "three"] {
            queue.submit("alice", "ws", request(body, "alice")).await.unwrap();
        }

        wait_until(|| processor.log.read().len() == 3).await;
        assert_eq!(
            processor.log.read().clone(),
            vec!["alice:one", "alice:two", "alice:three"]
        );
        assert_eq!(*processor.max_overlap.read(), 1);
    }

    #[tokio::test]
    async fn different_users_run_concurrently() {
        let processor = Arc::new(TracingProcessor::new(Duration::from_millis(50)));
        let (queue, _) = queue_with(processor.clone());

        queue.submit("alice", "ws", request("a", "alice")).await.unwrap();
        queue.submit("bob", "ws", request("b", "bob")).await.unwrap();

        let started = std::time::Instant::now();
        wait_until(|| processor.log.read().len() == 2).await;
        // Two 50ms jobs; parallel execution keeps total well under 2×
        assert!(started.elapsed() < Duration::from_millis(95));
    }

    #[tokio::test]
    async fn entry_lifecycle_reaches_completed() {
        let processor = Arc::new(TracingProcessor::new(Duration::from_millis(5)));
        let (queue, jobs) = queue_with(processor);

        let id = queue.submit("alice", "ws", request("x", "alice")).await.unwrap();
        wait_until(|| {
            let entries = jobs.entries.read();
            entries.get(&id).map(|e| e.status) == Some(JobStatus::Completed)
        })
        .await;

        let entry = jobs.get_entry(id).await.unwrap().unwrap();
        assert_eq!(entry.output, Some(serde_json::json!({"ok": true})));
        assert!(entry.error.is_none());
    }

    #[tokio::test]
    async fn failing_job_marks_entry_failed() {
        let mut processor = TracingProcessor::new(Duration::from_millis(5));
        processor.fail_bodies = vec!["bad".to_string()];
        let processor = Arc::new(processor);
        let (queue, jobs) = queue_with(processor);

        let id = queue.submit("alice", "ws", request("bad", "alice")).await.unwrap();
        wait_until(|| {
            jobs.entries.read().get(&id).map(|e| e.status) == Some(JobStatus::Failed)
        })
        .await;

        let entry = jobs.get_entry(id).await.unwrap().unwrap();
        assert!(entry.error.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_enqueue() {
        let processor = Arc::new(TracingProcessor::new(Duration::from_millis(1)));
        let (queue, jobs) = queue_with(processor);

        let result = queue.submit("alice", "ws", request("", "alice")).await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(jobs.entries.read().is_empty());
    }

    #[tokio::test]
    async fn recover_pending_reenqueues_in_order() {
        let processor = Arc::new(TracingProcessor::new(Duration::from_millis(5)));
        let jobs = Arc::new(TestJobs::default());

        // Simulate entries left over from a previous process
        for body in ["r1", "r2"] {
            let entry = IngestionQueueEntry::pending(
                "ws".into(),
                None,
                serde_json::to_value(request(body, "alice")).unwrap(),
            );
            jobs.create_entry(&entry).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let queue = IngestQueue::new(QueueConfig::default(), processor.clone(), jobs);
        let recovered = queue.recover_pending().await.unwrap();
        assert_eq!(recovered, 2);

        wait_until(|| processor.log.read().len() == 2).await;
        assert_eq!(processor.log.read().clone(), vec!["alice:r1", "alice:r2"]);
    }

    #[tokio::test]
    async fn shutdown_cancels_queued_jobs() {
        let processor = Arc::new(TracingProcessor::new(Duration::from_millis(200)));
        let (queue, jobs) = queue_with(processor);

        let running = queue.submit("alice", "ws", request("slow", "alice")).await.unwrap();
        let queued = queue.submit("alice", "ws", request("next", "alice")).await.unwrap();

        // Let the first job start
        wait_until(|| {
            jobs.entries.read().get(&running).map(|e| e.status) == Some(JobStatus::Processing)
        })
        .await;

        queue.shutdown();

        wait_until(|| {
            let entries = jobs.entries.read();
            entries.get(&running).map(|e| e.status) == Some(JobStatus::Failed)
                && entries.get(&queued).map(|e| e.status) == Some(JobStatus::Failed)
        })
        .await;

        let entries = jobs.entries.read();
        assert_eq!(entries.get(&running).unwrap().error.as_deref(), Some("cancelled"));
        assert_eq!(entries.get(&queued).unwrap().error.as_deref(), Some("cancelled"));
    }
}
