//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Queue backend configuration.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Sliding-window tracker configuration.
    #[serde(default)]
    pub tracker: TrackerConfig,
    /// Per-job-class budgets.
    #[serde(default)]
    pub jobs: JobsConfig,
    /// Worker pool configuration.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// LLM backend configuration.
    #[serde(default)]
    pub llm: LlmConfig,
}

/// Queue backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Redis connection URL.
    #[serde(default = "default_queue_url")]
    pub url: String,
    /// Namespace prefix for all queue keys.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Blocking pop timeout for worker loops, in seconds.
    #[serde(default = "default_pop_timeout_secs")]
    pub pop_timeout_secs: u64,
    /// Result polling granularity for waiters, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: default_queue_url(),
            namespace: default_namespace(),
            pop_timeout_secs: default_pop_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Sliding-window tracker configuration.
///
/// Values are plain seconds/counts here; the tracker types convert them
/// into their own duration-based configs.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Rate tracker trailing window, in seconds.
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,
    /// Events within the window above which an identity is over the limit.
    #[serde(default = "default_rate_threshold")]
    pub rate_threshold: usize,
    /// How long activity entries are retained, in seconds.
    #[serde(default = "default_activity_retention_secs")]
    pub activity_retention_secs: u64,
    /// Trailing window evaluated for engagement, in seconds.
    #[serde(default = "default_activity_window_secs")]
    pub activity_window_secs: u64,
    /// Minimum messages within the evaluation window.
    #[serde(default = "default_activity_min_messages")]
    pub activity_min_messages: usize,
    /// Minimum distinct actors within the evaluation window.
    #[serde(default = "default_activity_min_actors")]
    pub activity_min_actors: usize,
    /// Cooldown between engagement triggers for one group, in seconds.
    #[serde(default = "default_engage_cooldown_secs")]
    pub engage_cooldown_secs: u64,
    /// Probability of engaging once all thresholds pass (0.0..=1.0).
    #[serde(default = "default_engage_chance")]
    pub engage_chance: f64,
    /// Interval between idle-state reaping sweeps, in seconds.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            rate_window_secs: default_rate_window_secs(),
            rate_threshold: default_rate_threshold(),
            activity_retention_secs: default_activity_retention_secs(),
            activity_window_secs: default_activity_window_secs(),
            activity_min_messages: default_activity_min_messages(),
            activity_min_actors: default_activity_min_actors(),
            engage_cooldown_secs: default_engage_cooldown_secs(),
            engage_chance: default_engage_chance(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

/// Per-job-class wait budgets and result TTLs.
///
/// These are properties of the dispatching caller, not the queue itself.
#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Wait budget for safety scans, in seconds.
    #[serde(default = "default_safety_scan_timeout_secs")]
    pub safety_scan_timeout_secs: u64,
    /// Result slot TTL for safety scans, in seconds.
    #[serde(default = "default_safety_scan_result_ttl_secs")]
    pub safety_scan_result_ttl_secs: u64,
    /// Wait budget for generative replies, in seconds.
    #[serde(default = "default_llm_reply_timeout_secs")]
    pub llm_reply_timeout_secs: u64,
    /// Result slot TTL for generative replies, in seconds.
    #[serde(default = "default_llm_reply_result_ttl_secs")]
    pub llm_reply_result_ttl_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            safety_scan_timeout_secs: default_safety_scan_timeout_secs(),
            safety_scan_result_ttl_secs: default_safety_scan_result_ttl_secs(),
            llm_reply_timeout_secs: default_llm_reply_timeout_secs(),
            llm_reply_result_ttl_secs: default_llm_reply_result_ttl_secs(),
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent worker loops in this process.
    #[serde(default = "default_worker_concurrency")]
    pub concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_worker_concurrency(),
        }
    }
}

/// LLM backend configuration (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Chat completions endpoint.
    #[serde(default = "default_llm_api_url")]
    pub api_url: String,
    /// API key. When unset, LLM-backed handlers are disabled.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model used for conversational replies.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Model used for content-safety classification.
    #[serde(default = "default_guard_model")]
    pub guard_model: String,
    /// Per-request HTTP timeout, in seconds.
    #[serde(default = "default_llm_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: default_llm_api_url(),
            api_key: None,
            chat_model: default_chat_model(),
            guard_model: default_guard_model(),
            request_timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_queue_url() -> String {
    "redis://localhost:6379/0".to_string()
}

fn default_namespace() -> String {
    "guildest".to_string()
}

const fn default_pop_timeout_secs() -> u64 {
    5
}

const fn default_poll_interval_ms() -> u64 {
    250
}

const fn default_rate_window_secs() -> u64 {
    10
}

const fn default_rate_threshold() -> usize {
    20
}

const fn default_activity_retention_secs() -> u64 {
    30
}

const fn default_activity_window_secs() -> u64 {
    20
}

const fn default_activity_min_messages() -> usize {
    6
}

const fn default_activity_min_actors() -> usize {
    3
}

const fn default_engage_cooldown_secs() -> u64 {
    45
}

const fn default_engage_chance() -> f64 {
    0.35
}

const fn default_cleanup_interval_secs() -> u64 {
    300
}

const fn default_safety_scan_timeout_secs() -> u64 {
    30
}

const fn default_safety_scan_result_ttl_secs() -> u64 {
    90
}

const fn default_llm_reply_timeout_secs() -> u64 {
    75
}

const fn default_llm_reply_result_ttl_secs() -> u64 {
    180
}

const fn default_worker_concurrency() -> usize {
    2
}

fn default_llm_api_url() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}

fn default_chat_model() -> String {
    "llama-3.1-8b-instant".to_string()
}

fn default_guard_model() -> String {
    "meta-llama/llama-guard-4-12b".to_string()
}

const fn default_llm_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `GUILDEST_ENV`)
    /// 3. Environment variables with `GUILDEST__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("GUILDEST_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("GUILDEST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("GUILDEST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
