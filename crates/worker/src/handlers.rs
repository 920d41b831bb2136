//! Job handlers executed by the worker pool.

use std::sync::Arc;

use guildest_common::{AppError, AppResult};
use guildest_queue::{HandlerRegistry, Job, handler_fn};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::llm::LlmClient;

/// Payload of an `llm_reply` job.
#[derive(Debug, Deserialize, Validate)]
pub struct LlmReplyPayload {
    /// The message to reply to.
    #[validate(length(min = 1, max = 4000))]
    pub prompt: String,
    /// Display name of the author being answered.
    #[serde(default = "default_username")]
    pub username: String,
    /// Group display name, for the reply persona.
    #[serde(default)]
    pub guild_name: Option<String>,
    /// Recent channel messages, pre-rendered by the dispatching side.
    #[serde(default)]
    pub channel_context: Option<String>,
}

fn default_username() -> String {
    "friend".to_string()
}

/// Payload of a `safety_scan` job.
#[derive(Debug, Deserialize, Validate)]
pub struct SafetyScanPayload {
    /// The message content to classify.
    #[serde(default)]
    pub content: String,
}

fn decode<T>(job: &Job) -> AppResult<T>
where
    T: serde::de::DeserializeOwned + Validate,
{
    let payload: T = serde_json::from_value(job.payload.clone())
        .map_err(|e| AppError::Validation(format!("{} payload: {e}", job.job_type)))?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    Ok(payload)
}

/// Build the registry the worker loops dispatch through.
#[must_use]
pub fn build_registry(llm: Arc<LlmClient>) -> HandlerRegistry {
    let chat = Arc::clone(&llm);
    let llm_reply = handler_fn(move |job: Job| {
        let llm = Arc::clone(&chat);
        async move {
            let payload: LlmReplyPayload = decode(&job)?;
            let reply = llm
                .generate_reply(
                    &payload.prompt,
                    &payload.username,
                    payload.guild_name.as_deref(),
                    payload.channel_context.as_deref(),
                )
                .await?;
            Ok(json!({ "reply": reply }))
        }
    });

    let guard = llm;
    let safety_scan = handler_fn(move |job: Job| {
        let llm = Arc::clone(&guard);
        async move {
            let payload: SafetyScanPayload = decode(&job)?;
            if payload.content.is_empty() {
                // Nothing to classify; report no verdict rather than failing.
                return Ok(json!({ "verdict": null }));
            }
            let verdict = llm.classify_safety(&payload.content).await?;
            Ok(json!({ "verdict": verdict }))
        }
    });

    HandlerRegistry::new(llm_reply, safety_scan)
}
