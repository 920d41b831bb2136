//! Correlated result retrieval.

use std::sync::Arc;
use std::time::Duration;

use guildest_common::{AppError, AppResult};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::warn;

use crate::job::JobResult;
use crate::store::QueueStore;

/// Waits for the result slot of a dispatched job to be filled.
///
/// Polls the store on a fixed granularity; the wait is bounded by the
/// caller's deadline and never exceeds it by more than one poll interval.
#[derive(Clone)]
pub struct ResultWaiter {
    store: Arc<dyn QueueStore>,
    namespace: String,
    poll_interval: Duration,
}

impl ResultWaiter {
    /// Create a waiter for one namespace.
    pub fn new(
        store: Arc<dyn QueueStore>,
        namespace: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            poll_interval,
        }
    }

    /// Block the calling task until the job's result is published or
    /// `timeout` elapses.
    ///
    /// On timeout the job id is logged and the wait is abandoned; a result
    /// published later stays unread in its slot until its TTL removes it.
    pub async fn await_result(&self, job_id: &str, timeout: Duration) -> AppResult<JobResult> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(result) = self.store.get_result(&self.namespace, job_id).await? {
                return Ok(result);
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(job_id = %job_id, "timed out waiting for job result, dropping");
                return Err(AppError::ResultTimeout(job_id.to_string()));
            }

            tokio::time::sleep_until(deadline.min(now + self.poll_interval)).await;
        }
    }

    /// Run the wait as its own task so the caller keeps handling other
    /// events. Timeouts resolve to `None`; they are already logged by
    /// [`Self::await_result`].
    #[must_use]
    pub fn spawn_wait(&self, job_id: String, timeout: Duration) -> JoinHandle<Option<JobResult>> {
        let waiter = self.clone();
        tokio::spawn(async move {
            match waiter.await_result(&job_id, timeout).await {
                Ok(result) => Some(result),
                Err(AppError::ResultTimeout(_)) => None,
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "result wait failed");
                    None
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryQueueStore;
    use serde_json::json;

    fn waiter(store: &Arc<MemoryQueueStore>) -> ResultWaiter {
        let store: Arc<dyn QueueStore> = store.clone();
        ResultWaiter::new(store, "test", Duration::from_millis(250))
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_result_published_before_deadline() {
        let store = Arc::new(MemoryQueueStore::new());
        let waiter = waiter(&store);

        let publisher = {
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                store
                    .put_result(
                        "test",
                        "j-1",
                        &JobResult::ok("j-1", json!({"verdict": "safe"})),
                        Duration::from_secs(60),
                    )
                    .await
            })
        };

        let result = waiter
            .await_result("j-1", Duration::from_secs(30))
            .await
            .expect("result");
        assert!(result.is_ok());
        publisher.await.expect("join").expect("publish");
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_nothing_published() {
        let store = Arc::new(MemoryQueueStore::new());
        let waiter = waiter(&store);

        let started = Instant::now();
        let err = waiter
            .await_result("j-missing", Duration::from_secs(30))
            .await
            .expect_err("timeout");

        assert!(matches!(err, AppError::ResultTimeout(_)));
        // Bounded by the deadline plus at most one poll interval.
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(30));
        assert!(waited <= Duration::from_secs(31));
    }

    #[tokio::test]
    async fn test_result_already_present_returns_immediately() {
        let store = Arc::new(MemoryQueueStore::new());
        store
            .put_result(
                "test",
                "j-2",
                &JobResult::ok("j-2", json!({"reply": "hi"})),
                Duration::from_secs(60),
            )
            .await
            .expect("put");

        let result = waiter(&store)
            .await_result("j-2", Duration::from_secs(1))
            .await
            .expect("result");
        assert_eq!(result.job_id, "j-2");
    }
}
