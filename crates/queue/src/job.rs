//! Job and result records.

use chrono::{DateTime, Utc};
use guildest_common::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of job kinds this system knows how to execute.
///
/// The queue carries the kind as a string tag so workers written against
/// other runtimes can interoperate, but dispatch and handler resolution go
/// through this enum so adding a kind forces every match to be revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Generate a conversational reply via the language model.
    LlmReply,
    /// Classify message content against the safety model.
    SafetyScan,
}

impl JobKind {
    /// The wire tag for this kind.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::LlmReply => "llm_reply",
            Self::SafetyScan => "safety_scan",
        }
    }

    /// Parse a wire tag into a known kind.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "llm_reply" => Some(Self::LlmReply),
            "safety_scan" => Some(Self::SafetyScan),
            _ => None,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A queued unit of work. Immutable once enqueued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique id, generated at enqueue time.
    pub job_id: String,

    /// Wire tag naming the kind of work.
    pub job_type: String,

    /// Kind-specific input, opaque to the queue.
    #[serde(default)]
    pub payload: serde_json::Value,

    /// Identity on whose behalf the job was dispatched.
    #[serde(default)]
    pub requested_by: Option<String>,

    /// Seconds the result slot stays readable after publication.
    #[serde(default = "default_result_ttl")]
    pub result_ttl: u64,

    /// When the dispatcher enqueued the job.
    #[serde(default = "Utc::now")]
    pub enqueued_at: DateTime<Utc>,
}

const fn default_result_ttl() -> u64 {
    120
}

impl Job {
    /// The known kind of this job, if its tag is recognized.
    #[must_use]
    pub fn kind(&self) -> Option<JobKind> {
        JobKind::from_tag(&self.job_type)
    }
}

/// Outcome status of a processed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    /// Handler completed and produced a value.
    Ok,
    /// Handler was missing or failed.
    Error,
}

/// The published outcome of a job, stored in its result slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    /// Id of the job this result answers.
    pub job_id: String,

    /// Whether the handler succeeded.
    pub status: ResultStatus,

    /// Handler output on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,

    /// Stable error code on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    /// Human-readable failure detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the worker published this result.
    #[serde(default = "Utc::now")]
    pub produced_at: DateTime<Utc>,
}

impl JobResult {
    /// Build a successful result.
    #[must_use]
    pub fn ok(job_id: &str, value: serde_json::Value) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: ResultStatus::Ok,
            value: Some(value),
            error_code: None,
            error: None,
            produced_at: Utc::now(),
        }
    }

    /// Build an error result from an application error.
    #[must_use]
    pub fn from_error(job_id: &str, error: &AppError) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: ResultStatus::Error,
            value: None,
            error_code: Some(error.error_code().to_string()),
            error: Some(error.to_string()),
            produced_at: Utc::now(),
        }
    }

    /// Whether the handler succeeded.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self.status, ResultStatus::Ok)
    }
}
