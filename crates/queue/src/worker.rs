//! Competing-consumer worker loops.

use std::sync::Arc;
use std::time::Duration;

use guildest_common::AppError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::job::{Job, JobResult};
use crate::registry::HandlerRegistry;
use crate::store::QueueStore;

/// Delay before retrying after the queue backend reports an error.
const POP_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// A pool of independent worker loops competing on one namespace.
///
/// Loops share nothing but the store: the atomic pop is the only
/// coordination point, so pools in separate processes scale the same way
/// as loops in this one.
pub struct WorkerPool {
    store: Arc<dyn QueueStore>,
    registry: Arc<HandlerRegistry>,
    namespace: String,
    pop_timeout: Duration,
    concurrency: usize,
}

impl WorkerPool {
    /// Create a pool; no loops run until [`Self::spawn`].
    pub fn new(
        store: Arc<dyn QueueStore>,
        registry: Arc<HandlerRegistry>,
        namespace: impl Into<String>,
        pop_timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            registry,
            namespace: namespace.into(),
            pop_timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Spawn the worker loops. Each loop runs until `shutdown` turns true
    /// or the sender side is dropped.
    #[must_use]
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        (0..self.concurrency)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    self.store.clone(),
                    self.registry.clone(),
                    self.namespace.clone(),
                    self.pop_timeout,
                    worker_id,
                    shutdown.clone(),
                ))
            })
            .collect()
    }
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            // Sender dropped; treat as shutdown.
            return;
        }
    }
}

/// A single worker loop: pop, execute, publish, repeat.
pub async fn run_worker(
    store: Arc<dyn QueueStore>,
    registry: Arc<HandlerRegistry>,
    namespace: String,
    pop_timeout: Duration,
    worker_id: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(worker_id, namespace = %namespace, "worker loop started");

    loop {
        let popped = tokio::select! {
            () = shutdown_requested(&mut shutdown) => break,
            popped = store.pop(&namespace, pop_timeout) => popped,
        };

        match popped {
            Ok(None) => {}
            Ok(Some(job)) => process_job(&store, &registry, &namespace, worker_id, job).await,
            Err(e) => {
                warn!(worker_id, error = %e, "queue pop failed, backing off");
                tokio::time::sleep(POP_ERROR_BACKOFF).await;
            }
        }
    }

    info!(worker_id, "worker loop stopped");
}

/// Execute one popped job and publish its outcome.
///
/// Handler failures become error results with the job's own TTL; they
/// never escape this function, so a bad job cannot take the loop down.
async fn process_job(
    store: &Arc<dyn QueueStore>,
    registry: &Arc<HandlerRegistry>,
    namespace: &str,
    worker_id: usize,
    job: Job,
) {
    let job_id = job.job_id.clone();
    let ttl = Duration::from_secs(job.result_ttl.max(1));

    let result = match job.kind() {
        None => {
            warn!(
                worker_id,
                job_id = %job_id,
                job_type = %job.job_type,
                "no handler registered for job type"
            );
            JobResult::from_error(&job_id, &AppError::HandlerNotFound(job.job_type.clone()))
        }
        Some(kind) => {
            info!(worker_id, job_id = %job_id, job_type = %kind, "executing job");
            match (registry.resolve(kind))(job).await {
                Ok(value) => {
                    info!(worker_id, job_id = %job_id, job_type = %kind, "job completed");
                    JobResult::ok(&job_id, value)
                }
                Err(e) => {
                    error!(
                        worker_id,
                        job_id = %job_id,
                        job_type = %kind,
                        error = %e,
                        "job handler failed"
                    );
                    JobResult::from_error(&job_id, &e)
                }
            }
        }
    };

    if let Err(e) = store.put_result(namespace, &job_id, &result, ttl).await {
        error!(job_id = %job_id, error = %e, "failed to publish job result");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobKind;
    use crate::registry::handler_fn;
    use crate::store::MemoryQueueStore;
    use serde_json::json;

    fn test_registry() -> Arc<HandlerRegistry> {
        Arc::new(HandlerRegistry::new(
            handler_fn(|_job: Job| async move {
                Err(AppError::HandlerExecution("model unavailable".into()))
            }),
            handler_fn(
                |job: Job| async move { Ok(json!({"verdict": "safe", "echo": job.payload})) },
            ),
        ))
    }

    fn job(id: &str, job_type: &str) -> Job {
        Job {
            job_id: id.to_string(),
            job_type: job_type.to_string(),
            payload: json!({"content": "hi"}),
            requested_by: None,
            result_ttl: 60,
            enqueued_at: chrono::Utc::now(),
        }
    }

    async fn published(store: &MemoryQueueStore, job_id: &str) -> JobResult {
        store
            .get_result("ns", job_id)
            .await
            .expect("get_result")
            .expect("result present")
    }

    #[tokio::test]
    async fn test_successful_handler_publishes_ok_result() {
        let store = Arc::new(MemoryQueueStore::new());
        let dyn_store: Arc<dyn QueueStore> = store.clone();

        process_job(
            &dyn_store,
            &test_registry(),
            "ns",
            0,
            job("j-ok", JobKind::SafetyScan.tag()),
        )
        .await;

        let result = published(&store, "j-ok").await;
        assert!(result.is_ok());
        assert_eq!(result.value.as_ref().map(|v| &v["verdict"]), Some(&json!("safe")));
    }

    #[tokio::test]
    async fn test_failing_handler_publishes_error_result() {
        let store = Arc::new(MemoryQueueStore::new());
        let dyn_store: Arc<dyn QueueStore> = store.clone();

        process_job(
            &dyn_store,
            &test_registry(),
            "ns",
            0,
            job("j-fail", JobKind::LlmReply.tag()),
        )
        .await;

        let result = published(&store, "j-fail").await;
        assert!(!result.is_ok());
        assert_eq!(result.error_code.as_deref(), Some("HANDLER_EXECUTION_ERROR"));
    }

    #[tokio::test]
    async fn test_unknown_job_type_publishes_handler_not_found() {
        let store = Arc::new(MemoryQueueStore::new());
        let dyn_store: Arc<dyn QueueStore> = store.clone();

        process_job(
            &dyn_store,
            &test_registry(),
            "ns",
            0,
            job("j-unknown", "transcode_audio"),
        )
        .await;

        let result = published(&store, "j-unknown").await;
        assert!(!result.is_ok());
        assert_eq!(result.error_code.as_deref(), Some("HANDLER_NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_worker_loop_stops_on_shutdown() {
        let store: Arc<dyn QueueStore> = Arc::new(MemoryQueueStore::new());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(run_worker(
            store,
            test_registry(),
            "ns".to_string(),
            Duration::from_millis(50),
            0,
            rx,
        ));

        tx.send(true).expect("send shutdown");
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker stopped in time")
            .expect("join");
    }
}
