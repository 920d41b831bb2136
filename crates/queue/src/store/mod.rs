//! Queue store contract and backend selection.
//!
//! One contract, two implementations: [`RedisQueueStore`] is the shared
//! backend both the event path and external worker processes reach, and
//! [`MemoryQueueStore`] is the in-process alternative used when Redis
//! cannot be reached at startup (and by tests). Callers are oblivious to
//! which is active.

mod memory;
mod redis;

pub use memory::MemoryQueueStore;
pub use redis::RedisQueueStore;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use guildest_common::{AppResult, QueueConfig};
use tracing::{info, warn};

use crate::job::{Job, JobResult};

/// Key holding the pending job list for a namespace.
#[must_use]
pub fn tasks_key(namespace: &str) -> String {
    format!("{namespace}:tasks")
}

/// Key holding the result slot for a job.
#[must_use]
pub fn result_key(namespace: &str, job_id: &str) -> String {
    format!("{namespace}:results:{job_id}")
}

/// Shared, namespaced FIFO job queue with ephemeral per-job result slots.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Atomically append a job to the tail of the namespace's pending list.
    async fn push(&self, namespace: &str, job: &Job) -> AppResult<()>;

    /// Atomically remove and return the head job, blocking the calling
    /// worker up to `timeout`. Returns `Ok(None)` when the queue stayed
    /// empty for the whole timeout so workers can loop and re-check
    /// liveness.
    async fn pop(&self, namespace: &str, timeout: Duration) -> AppResult<Option<Job>>;

    /// Write a job's result slot, overwriting any prior value, and
    /// schedule expiry after `ttl`.
    async fn put_result(
        &self,
        namespace: &str,
        job_id: &str,
        result: &JobResult,
        ttl: Duration,
    ) -> AppResult<()>;

    /// Consume the job's result slot if a live value is present. Does not
    /// block; returns `Ok(None)` when the slot is empty or expired.
    async fn get_result(&self, namespace: &str, job_id: &str) -> AppResult<Option<JobResult>>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> AppResult<()>;
}

/// Which queue backend was selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    /// Shared Redis backend.
    Redis,
    /// In-process fallback.
    Memory,
}

impl fmt::Display for QueueBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redis => f.write_str("redis"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

/// Probe the configured Redis backend once and fall back to the in-process
/// store when it cannot be reached.
///
/// Jobs in a memory-backed queue are only visible to worker loops running
/// in the same process, so callers that depend on external workers should
/// log the returned backend.
pub async fn connect_with_fallback(config: &QueueConfig) -> (Arc<dyn QueueStore>, QueueBackend) {
    match RedisQueueStore::connect(&config.url).await {
        Ok(store) => {
            info!(url = %config.url, "connected to Redis queue backend");
            (Arc::new(store), QueueBackend::Redis)
        }
        Err(e) => {
            warn!(
                url = %config.url,
                error = %e,
                "queue backend unreachable, falling back to in-process queue"
            );
            (Arc::new(MemoryQueueStore::new()), QueueBackend::Memory)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_scheme() {
        assert_eq!(tasks_key("guildest"), "guildest:tasks");
        assert_eq!(result_key("guildest", "j-1"), "guildest:results:j-1");
    }

    #[tokio::test]
    async fn test_fallback_selects_memory_when_unreachable() {
        let config = QueueConfig {
            // Port 1 on loopback refuses immediately.
            url: "redis://127.0.0.1:1/0".to_string(),
            ..QueueConfig::default()
        };
        let (_store, backend) = connect_with_fallback(&config).await;
        assert_eq!(backend, QueueBackend::Memory);
    }
}
