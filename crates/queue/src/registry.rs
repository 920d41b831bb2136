//! Handler registry.
//!
//! One handler per [`JobKind`], fixed at startup. The registry is a plain
//! struct rather than a map so resolution is an exhaustive match: adding a
//! kind without wiring a handler is a compile error, and nothing can
//! register or replace handlers at runtime.

use std::sync::Arc;

use futures::future::BoxFuture;
use guildest_common::AppResult;

use crate::job::{Job, JobKind};

/// Future returned by a job handler.
pub type HandlerFuture = BoxFuture<'static, AppResult<serde_json::Value>>;

/// A boxed async job handler.
pub type Handler = Arc<dyn Fn(Job) -> HandlerFuture + Send + Sync>;

/// Wrap an async function into a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<serde_json::Value>> + Send + 'static,
{
    Arc::new(move |job| -> HandlerFuture { Box::pin(f(job)) })
}

/// Immutable mapping from job kind to handler, built once at startup and
/// shared by every worker loop.
pub struct HandlerRegistry {
    llm_reply: Handler,
    safety_scan: Handler,
}

impl HandlerRegistry {
    /// Build the registry with a handler for every known kind.
    #[must_use]
    pub fn new(llm_reply: Handler, safety_scan: Handler) -> Self {
        Self {
            llm_reply,
            safety_scan,
        }
    }

    /// The handler for a known job kind.
    #[must_use]
    pub fn resolve(&self, kind: JobKind) -> &(dyn Fn(Job) -> HandlerFuture + Send + Sync) {
        match kind {
            JobKind::LlmReply => self.llm_reply.as_ref(),
            JobKind::SafetyScan => self.safety_scan.as_ref(),
        }
    }
}
