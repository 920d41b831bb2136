//! Job dispatch.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use guildest_common::{AppResult, IdGenerator};
use tracing::debug;

use crate::job::{Job, JobKind};
use crate::store::QueueStore;

/// Builds job records and enqueues them on the shared store.
///
/// `dispatch` returns as soon as the record is appended; the caller pairs
/// the returned id with a [`crate::ResultWaiter`] if it wants the outcome.
#[derive(Clone)]
pub struct JobDispatcher {
    store: Arc<dyn QueueStore>,
    namespace: String,
    id_gen: IdGenerator,
}

impl JobDispatcher {
    /// Create a dispatcher for one namespace.
    pub fn new(store: Arc<dyn QueueStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            id_gen: IdGenerator::new(),
        }
    }

    /// The namespace this dispatcher enqueues into.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Enqueue a job and return its freshly generated id.
    pub async fn dispatch(
        &self,
        kind: JobKind,
        payload: serde_json::Value,
        requested_by: Option<&str>,
        result_ttl: Duration,
    ) -> AppResult<String> {
        let job = Job {
            job_id: self.id_gen.generate(),
            job_type: kind.tag().to_string(),
            payload,
            requested_by: requested_by.map(ToString::to_string),
            result_ttl: result_ttl.as_secs(),
            enqueued_at: Utc::now(),
        };

        self.store.push(&self.namespace, &job).await?;

        debug!(
            job_id = %job.job_id,
            job_type = %kind,
            requested_by = job.requested_by.as_deref().unwrap_or("-"),
            "queued job"
        );

        Ok(job.job_id)
    }
}
