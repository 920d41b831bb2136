//! Client for the OpenAI-compatible chat-completions backend.

use std::time::Duration;

use guildest_common::{AppError, AppResult, LlmConfig};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

/// Parsed verdict from the safety classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyVerdict {
    /// `safe` or `unsafe`.
    pub verdict: String,
    /// Violation categories, when the classifier names them.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Free-form classifier detail.
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceContent,
}

#[derive(Deserialize)]
struct ChatChoiceContent {
    content: Option<String>,
}

/// Chat-completions client shared by all handlers in this process.
///
/// Constructed once at startup; when no API key is configured the client
/// comes up disabled and every call returns a structured error instead of
/// taking the worker loop down.
pub struct LlmClient {
    http: reqwest::Client,
    api_url: Url,
    api_key: Option<String>,
    chat_model: String,
    guard_model: String,
}

impl LlmClient {
    /// Build a client from configuration.
    pub fn new(config: &LlmConfig) -> AppResult<Self> {
        let api_url = Url::parse(&config.api_url)
            .map_err(|e| AppError::Config(format!("invalid LLM api_url: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {e}")))?;

        if config.api_key.is_none() {
            warn!("LLM api key is not configured; model-backed handlers are disabled");
        }

        Ok(Self {
            http,
            api_url,
            api_key: config.api_key.clone(),
            chat_model: config.chat_model.clone(),
            guard_model: config.guard_model.clone(),
        })
    }

    /// Whether a key is configured and calls can go out.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> AppResult<String> {
        let Some(api_key) = &self.api_key else {
            return Err(AppError::HandlerExecution(
                "LLM backend is not configured".to_string(),
            ));
        };

        let request = ChatRequest {
            model,
            messages,
            temperature,
            max_tokens,
        };

        let response = self
            .http
            .post(self.api_url.clone())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::HandlerExecution(format!("chat completion request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::HandlerExecution(format!(
                "chat completion failed with {status}: {body}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::HandlerExecution(format!("malformed completion response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::HandlerExecution("completion returned no content".to_string()))
    }

    /// Generate a conversational reply for a chat message.
    pub async fn generate_reply(
        &self,
        prompt: &str,
        username: &str,
        guild_name: Option<&str>,
        channel_context: Option<&str>,
    ) -> AppResult<String> {
        let place = guild_name.unwrap_or("this community");
        let mut system = format!(
            "You are a friendly, professional member of the {place} chat community. \
             Reply to {username} conversationally. Keep it to a few sentences, stay \
             on the topic of their message, and never mention that you are a bot."
        );
        if let Some(context) = channel_context {
            system.push_str("\n\nRecent channel messages for context:\n");
            system.push_str(context);
        }

        let messages = [
            ChatMessage {
                role: "system",
                content: system,
            },
            ChatMessage {
                role: "user",
                content: prompt.to_string(),
            },
        ];

        self.chat(&self.chat_model, &messages, 0.7, 300).await
    }

    /// Classify message content for safety violations.
    ///
    /// Returns `None` when the classifier's answer cannot be interpreted;
    /// callers treat that as "no verdict", matching a disabled scanner.
    pub async fn classify_safety(&self, content: &str) -> AppResult<Option<SafetyVerdict>> {
        let system = "You are a strict safety classifier. Analyze the provided chat \
                      message content. Respond with compact JSON using the following \
                      shape: {\"verdict\":\"safe\"|\"unsafe\",\"categories\":[\"...\"],\
                      \"details\":\"...\"}. Mark any harassment, hate, self-harm, \
                      sexual, or violent content as unsafe.";

        let messages = [
            ChatMessage {
                role: "system",
                content: system.to_string(),
            },
            ChatMessage {
                role: "user",
                content: format!("Message:\n{content}\nReturn only the JSON verdict."),
            },
        ];

        let raw = self.chat(&self.guard_model, &messages, 0.0, 300).await?;
        Ok(parse_guard_verdict(&raw))
    }
}

/// Parse the classifier's answer, tolerating plain-text verdicts from
/// models that ignore the JSON instruction.
fn parse_guard_verdict(raw: &str) -> Option<SafetyVerdict> {
    let trimmed = raw.trim();

    if let Ok(verdict) = serde_json::from_str::<SafetyVerdict>(trimmed) {
        return Some(verdict);
    }

    let lowered = trimmed.to_lowercase();
    if lowered.starts_with("safe") {
        return Some(SafetyVerdict {
            verdict: "safe".to_string(),
            categories: Vec::new(),
            details: Some(trimmed.to_string()),
        });
    }
    if lowered.contains("unsafe") || lowered.contains("flag") {
        return Some(SafetyVerdict {
            verdict: "unsafe".to_string(),
            categories: Vec::new(),
            details: Some(trimmed.to_string()),
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_structured_verdict() {
        let verdict = parse_guard_verdict(
            r#"{"verdict":"unsafe","categories":["harassment"],"details":"targeted insult"}"#,
        )
        .expect("parsed");
        assert_eq!(verdict.verdict, "unsafe");
        assert_eq!(verdict.categories, vec!["harassment".to_string()]);
    }

    #[test]
    fn test_parse_plain_text_fallbacks() {
        let safe = parse_guard_verdict("safe").expect("parsed");
        assert_eq!(safe.verdict, "safe");

        let unsafe_verdict = parse_guard_verdict("This content is UNSAFE.").expect("parsed");
        assert_eq!(unsafe_verdict.verdict, "unsafe");
    }

    #[test]
    fn test_unintelligible_answer_is_no_verdict() {
        assert!(parse_guard_verdict("as an AI I cannot help with that").is_none());
    }

    #[test]
    fn test_disabled_client_reports_structured_error() {
        let client = LlmClient::new(&LlmConfig::default()).expect("client");
        assert!(!client.is_enabled());
    }
}
