//! Background job queue for guildest.
//!
//! This crate decouples expensive chat operations from the event path
//! using a shared Redis list (with an in-process fallback):
//!
//! - **Jobs**: language-model replies, content-safety scans
//! - **Store**: namespaced FIFO queue plus expiring per-job result slots
//! - **Dispatcher**: enqueue-and-continue with a correlation id
//! - **Waiter**: deadline-bounded retrieval of one job's result
//! - **Workers**: competing consumer loops over a fixed handler registry

pub mod dispatch;
pub mod job;
pub mod registry;
pub mod store;
pub mod waiter;
pub mod worker;

pub use dispatch::JobDispatcher;
pub use job::{Job, JobKind, JobResult, ResultStatus};
pub use registry::{Handler, HandlerFuture, HandlerRegistry, handler_fn};
pub use store::{
    MemoryQueueStore, QueueBackend, QueueStore, RedisQueueStore, connect_with_fallback,
};
pub use waiter::ResultWaiter;
pub use worker::{WorkerPool, run_worker};
