//! Guildest worker entry point.
//!
//! Pops jobs from the shared queue and executes them until SIGINT/SIGTERM.
//! Runs against the Redis backend when it is reachable; otherwise it comes
//! up on the in-process queue, which is only useful for local development.

mod handlers;
mod llm;

use std::sync::Arc;
use std::time::Duration;

use guildest_common::Config;
use guildest_queue::{QueueBackend, WorkerPool, connect_with_fallback};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::handlers::build_registry;
use crate::llm::LlmClient;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "guildest=debug".into()),
        )
        .init();

    info!("Starting guildest worker...");

    // Load configuration
    let config = Config::load()?;

    // Select the queue backend, preferring Redis
    let (store, backend) = connect_with_fallback(&config.queue).await;
    if backend == QueueBackend::Memory {
        warn!("running on the in-process queue; jobs from other processes will not arrive");
    }

    // Build the handler registry once; it stays fixed for the process lifetime
    let llm = Arc::new(LlmClient::new(&config.llm)?);
    if !llm.is_enabled() {
        warn!("model-backed handlers will return errors until an API key is configured");
    }
    let registry = Arc::new(build_registry(llm));

    // Spawn the competing consumer loops
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pool = WorkerPool::new(
        store,
        registry,
        config.queue.namespace.clone(),
        Duration::from_secs(config.queue.pop_timeout_secs),
        config.worker.concurrency,
    );
    let workers = pool.spawn(shutdown_rx);

    info!(
        backend = %backend,
        namespace = %config.queue.namespace,
        concurrency = config.worker.concurrency,
        "worker pool running"
    );

    shutdown_signal().await;

    shutdown_tx
        .send(true)
        .expect("worker loops dropped the shutdown channel");
    for worker in workers {
        let _ = worker.await;
    }

    info!("Worker stopped");
    Ok(())
}
