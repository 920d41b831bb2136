//! Common utilities and shared types for guildest.
//!
//! This crate provides foundational components used across all guildest
//! crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: Job identifiers via [`IdGenerator`]
//!
//! # Example
//!
//! ```no_run
//! use guildest_common::{AppResult, Config, IdGenerator};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let job_id = id_gen.generate();
//!     println!("Generated job id: {job_id} for {}", config.queue.namespace);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;

pub use config::{Config, JobsConfig, LlmConfig, QueueConfig, TrackerConfig, WorkerConfig};
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
