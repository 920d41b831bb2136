//! Inbound message orchestration.
//!
//! Ties the synchronous signals (rate, activity) to the asynchronous job
//! path: every message is checked inline, expensive work is enqueued and
//! awaited off the event path, and outcomes flow back to the chat surface
//! through [`EngagementSink`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guildest_common::{AppResult, Config, JobsConfig};
use guildest_queue::{JobDispatcher, JobKind, QueueStore, ResultWaiter};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::activity::{ActivityDetector, ActivityDetectorConfig};
use crate::rate::{RateTracker, RateTrackerConfig};

/// One inbound chat message, as seen by the processor.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// Group (server/guild) the message was posted in.
    pub group_id: String,
    /// Channel within the group.
    pub channel_id: String,
    /// Author identity.
    pub author_id: String,
    /// Author display name, used in reply prompts.
    pub author_name: String,
    /// Group display name, if known.
    pub group_name: Option<String>,
    /// Message text.
    pub content: String,
    /// Whether the author is an automated account.
    pub is_bot: bool,
    /// Whether the message directly addresses us (mention or reply).
    pub addressed: bool,
    /// When the message was posted.
    pub timestamp: DateTime<Utc>,
}

/// Synchronous verdicts for one message, returned to the event loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageDisposition {
    /// Author exceeded the rate limit with this message.
    pub spam: bool,
    /// Author's message count inside the rate window.
    pub message_count: usize,
    /// A reply job was dispatched for this message.
    pub engaged: bool,
}

/// Outcomes the processor hands back to the chat surface.
///
/// Implemented by the collaborator that owns the actual connection; the
/// processor never talks to the chat service itself.
#[async_trait]
pub trait EngagementSink: Send + Sync {
    /// Deliver a generated reply to the message's channel.
    async fn deliver_reply(&self, event: &MessageEvent, reply: &str) -> AppResult<()>;

    /// Report a message the safety scan flagged.
    async fn report_flagged(&self, event: &MessageEvent, verdict: &serde_json::Value)
        -> AppResult<()>;
}

/// Per-message orchestration over trackers, dispatcher and waiter.
#[derive(Clone)]
pub struct EventProcessor {
    rate: RateTracker,
    activity: ActivityDetector,
    dispatcher: JobDispatcher,
    waiter: ResultWaiter,
    sink: Arc<dyn EngagementSink>,
    budgets: JobsConfig,
}

impl EventProcessor {
    /// Build a processor from application configuration.
    #[must_use]
    pub fn new(config: &Config, store: Arc<dyn QueueStore>, sink: Arc<dyn EngagementSink>) -> Self {
        Self {
            rate: RateTracker::new(RateTrackerConfig::from(&config.tracker)),
            activity: ActivityDetector::new(ActivityDetectorConfig::from(&config.tracker)),
            dispatcher: JobDispatcher::new(store.clone(), config.queue.namespace.clone()),
            waiter: ResultWaiter::new(
                store,
                config.queue.namespace.clone(),
                Duration::from_millis(config.queue.poll_interval_ms),
            ),
            sink,
            budgets: config.jobs.clone(),
        }
    }

    /// The rate tracker, e.g. for moderation-driven resets.
    #[must_use]
    pub const fn rate_tracker(&self) -> &RateTracker {
        &self.rate
    }

    /// The activity detector, e.g. for per-group resets.
    #[must_use]
    pub const fn activity_detector(&self) -> &ActivityDetector {
        &self.activity
    }

    /// Handle one inbound message.
    ///
    /// Tracker checks run inline; everything expensive is dispatched to the
    /// queue and awaited by spawned tasks, so this returns as soon as the
    /// synchronous verdicts are known.
    pub async fn handle_message(&self, event: &MessageEvent) -> MessageDisposition {
        if event.is_bot {
            return MessageDisposition::default();
        }

        let (spam, message_count) = self.rate.check(&event.author_id, event.timestamp).await;

        let conversation_live = self
            .activity
            .record(&event.group_id, &event.author_id, event.timestamp)
            .await;

        if !event.content.is_empty() {
            self.spawn_safety_scan(event);
        }

        let engaged = conversation_live || event.addressed;
        if engaged && !event.content.is_empty() {
            self.spawn_reply(event);
        }

        MessageDisposition {
            spam,
            message_count,
            engaged,
        }
    }

    /// Queue a safety scan and report back if the verdict flags the message.
    fn spawn_safety_scan(&self, event: &MessageEvent) {
        let payload = json!({
            "content": event.content,
            "guild_id": event.group_id,
            "channel_id": event.channel_id,
            "author_id": event.author_id,
        });

        let processor = self.clone();
        let event = event.clone();
        let timeout = Duration::from_secs(self.budgets.safety_scan_timeout_secs);
        let result_ttl = Duration::from_secs(self.budgets.safety_scan_result_ttl_secs);

        tokio::spawn(async move {
            let job_id = match processor
                .dispatcher
                .dispatch(
                    JobKind::SafetyScan,
                    payload,
                    Some(&event.author_id),
                    result_ttl,
                )
                .await
            {
                Ok(job_id) => job_id,
                Err(e) => {
                    // Degrade: the message path goes on without a scan.
                    warn!(error = %e, "skipping safety scan, dispatch failed");
                    return;
                }
            };

            let Ok(Some(result)) = processor.waiter.spawn_wait(job_id, timeout).await else {
                return;
            };

            let succeeded = result.is_ok();
            let Some(value) = result.value.filter(|_| succeeded) else {
                debug!(job_id = %result.job_id, "safety scan produced no verdict");
                return;
            };

            // The verdict is either a structured object, a bare label, or
            // null when the classifier had nothing to say.
            let verdict = &value["verdict"];
            let label = verdict.as_str().or_else(|| verdict["verdict"].as_str());
            let is_safe = label.is_none_or(|v| v == "safe");
            if !is_safe {
                info!(
                    author_id = %event.author_id,
                    channel_id = %event.channel_id,
                    "message flagged by safety scan"
                );
                if let Err(e) = processor.sink.report_flagged(&event, verdict).await {
                    warn!(error = %e, "failed to report flagged message");
                }
            }
        });
    }

    /// Queue a reply generation and deliver the reply when it arrives.
    fn spawn_reply(&self, event: &MessageEvent) {
        let payload = json!({
            "prompt": event.content,
            "username": event.author_name,
            "guild_name": event.group_name,
            "guild_id": event.group_id,
            "user_id": event.author_id,
            "channel_id": event.channel_id,
        });

        let processor = self.clone();
        let event = event.clone();
        let timeout = Duration::from_secs(self.budgets.llm_reply_timeout_secs);
        let result_ttl = Duration::from_secs(self.budgets.llm_reply_result_ttl_secs);

        tokio::spawn(async move {
            let job_id = match processor
                .dispatcher
                .dispatch(
                    JobKind::LlmReply,
                    payload,
                    Some(&event.author_id),
                    result_ttl,
                )
                .await
            {
                Ok(job_id) => job_id,
                Err(e) => {
                    warn!(error = %e, "skipping reply, dispatch failed");
                    return;
                }
            };

            let Ok(Some(result)) = processor.waiter.spawn_wait(job_id, timeout).await else {
                return;
            };

            let succeeded = result.is_ok();
            let reply = result
                .value
                .filter(|_| succeeded)
                .and_then(|v| v["reply"].as_str().map(ToString::to_string));
            let Some(reply) = reply.filter(|r| !r.is_empty()) else {
                return;
            };

            if let Err(e) = processor.sink.deliver_reply(&event, &reply).await {
                warn!(error = %e, channel_id = %event.channel_id, "failed to deliver reply");
            }
        });
    }

    /// Spawn the periodic sweep that reaps idle tracker state, bounding
    /// memory for identities and groups that went quiet.
    #[must_use]
    pub fn spawn_maintenance(&self, interval: Duration) -> JoinHandle<()> {
        let rate = self.rate.clone();
        let activity = self.activity.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // immediate first tick
            loop {
                ticker.tick().await;
                let now = Utc::now();
                let identities = rate.cleanup(now).await;
                let groups = activity.cleanup(now).await;
                if identities + groups > 0 {
                    debug!(identities, groups, "reaped idle tracker state");
                }
            }
        })
    }
}
