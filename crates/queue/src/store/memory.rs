//! In-process queue store.
//!
//! Fallback backend selected when Redis is unreachable at startup, and the
//! store tests run against. Queues and result slots live behind one mutex;
//! pops park on a [`Notify`] so pushes wake exactly one waiting consumer.
//! Result expiry uses [`tokio::time::Instant`] so tests can drive TTLs
//! through the paused clock.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use guildest_common::AppResult;

use super::{result_key, QueueStore};
use crate::job::{Job, JobResult};

#[derive(Default)]
struct Inner {
    queues: HashMap<String, VecDeque<Job>>,
    results: HashMap<String, (JobResult, Instant)>,
}

impl Inner {
    fn purge_expired(&mut self, now: Instant) {
        self.results.retain(|_, (_, expires_at)| *expires_at > now);
    }
}

/// Queue store held entirely in process memory.
#[derive(Default)]
pub struct MemoryQueueStore {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl MemoryQueueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending jobs in a namespace.
    pub async fn pending_jobs(&self, namespace: &str) -> usize {
        let inner = self.inner.lock().await;
        inner.queues.get(namespace).map_or(0, VecDeque::len)
    }

    async fn try_pop(&self, namespace: &str) -> Option<Job> {
        let mut inner = self.inner.lock().await;
        inner.queues.get_mut(namespace)?.pop_front()
    }
}

#[async_trait::async_trait]
impl QueueStore for MemoryQueueStore {
    async fn push(&self, namespace: &str, job: &Job) -> AppResult<()> {
        {
            let mut inner = self.inner.lock().await;
            inner
                .queues
                .entry(namespace.to_string())
                .or_default()
                .push_back(job.clone());
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self, namespace: &str, timeout: Duration) -> AppResult<Option<Job>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register for wakeups before checking so a push between the
            // check and the wait is not missed.
            let notified = self.notify.notified();

            if let Some(job) = self.try_pop(namespace).await {
                // Pass leftover permits on to the next parked consumer.
                self.notify.notify_one();
                return Ok(Some(job));
            }

            tokio::select! {
                () = notified => {}
                () = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }

    async fn put_result(
        &self,
        namespace: &str,
        job_id: &str,
        result: &JobResult,
        ttl: Duration,
    ) -> AppResult<()> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.purge_expired(now);
        inner
            .results
            .insert(result_key(namespace, job_id), (result.clone(), now + ttl));
        Ok(())
    }

    async fn get_result(&self, namespace: &str, job_id: &str) -> AppResult<Option<JobResult>> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.purge_expired(now);
        Ok(inner
            .results
            .remove(&result_key(namespace, job_id))
            .map(|(result, _)| result))
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(id: &str) -> Job {
        Job {
            job_id: id.to_string(),
            job_type: "safety_scan".to_string(),
            payload: json!({"content": "hi"}),
            requested_by: None,
            result_ttl: 60,
            enqueued_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_pop_returns_pushed_job() {
        let store = MemoryQueueStore::new();
        store.push("ns", &job("a")).await.expect("push");

        let popped = store
            .pop("ns", Duration::from_millis(100))
            .await
            .expect("pop");
        assert_eq!(popped.map(|j| j.job_id).as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = MemoryQueueStore::new();
        store.push("ns-a", &job("a")).await.expect("push");

        let other = store
            .pop("ns-b", Duration::from_millis(10))
            .await
            .expect("pop");
        assert!(other.is_none());
        assert_eq!(store.pending_jobs("ns-a").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_wakes_on_push_while_waiting() {
        let store = std::sync::Arc::new(MemoryQueueStore::new());

        let consumer = {
            let store = store.clone();
            tokio::spawn(async move { store.pop("ns", Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        store.push("ns", &job("late")).await.expect("push");

        let popped = consumer.await.expect("join").expect("pop");
        assert_eq!(popped.map(|j| j.job_id).as_deref(), Some("late"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_expires_unread() {
        let store = MemoryQueueStore::new();
        let result = JobResult::ok("j-1", json!({"ok": true}));
        store
            .put_result("ns", "j-1", &result, Duration::from_secs(60))
            .await
            .expect("put");

        tokio::time::advance(Duration::from_secs(61)).await;

        let read = store.get_result("ns", "j-1").await.expect("get");
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn test_result_consumed_once() {
        let store = MemoryQueueStore::new();
        let result = JobResult::ok("j-1", json!({"ok": true}));
        store
            .put_result("ns", "j-1", &result, Duration::from_secs(60))
            .await
            .expect("put");

        assert!(store.get_result("ns", "j-1").await.expect("get").is_some());
        assert!(store.get_result("ns", "j-1").await.expect("get").is_none());
    }
}
