//! Per-group conversation-activity detection.
//!
//! Decides whether a group is holding a live, multi-party conversation
//! worth joining. Single-actor flooding is deliberately not its concern;
//! that is what [`crate::RateTracker`] catches.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use guildest_common::TrackerConfig;
use tokio::sync::RwLock;

/// Activity detector configuration.
#[derive(Debug, Clone)]
pub struct ActivityDetectorConfig {
    /// How long events are retained per group.
    pub retention: Duration,
    /// Trailing window evaluated on each call.
    pub window: Duration,
    /// Minimum messages inside the window.
    pub min_messages: usize,
    /// Minimum distinct actors inside the window.
    pub min_actors: usize,
    /// Cooldown between engagement triggers for one group.
    pub cooldown: Duration,
    /// Probability of engaging once the thresholds pass (0.0..=1.0).
    pub trigger_chance: f64,
}

impl Default for ActivityDetectorConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(30),
            window: Duration::from_secs(20),
            min_messages: 6,
            min_actors: 3,
            cooldown: Duration::from_secs(45),
            trigger_chance: 0.35,
        }
    }
}

impl From<&TrackerConfig> for ActivityDetectorConfig {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            retention: Duration::from_secs(config.activity_retention_secs),
            window: Duration::from_secs(config.activity_window_secs),
            min_messages: config.activity_min_messages,
            min_actors: config.activity_min_actors,
            cooldown: Duration::from_secs(config.engage_cooldown_secs),
            trigger_chance: config.engage_chance,
        }
    }
}

#[derive(Default)]
struct GroupState {
    events: VecDeque<(DateTime<Utc>, String)>,
    last_trigger: Option<DateTime<Utc>>,
}

/// Per-group sliding-window conversation signal.
#[derive(Clone)]
pub struct ActivityDetector {
    retention: TimeDelta,
    window: TimeDelta,
    min_messages: usize,
    min_actors: usize,
    cooldown: TimeDelta,
    trigger_chance: f64,
    states: Arc<RwLock<HashMap<String, GroupState>>>,
}

impl ActivityDetector {
    /// Create a detector with the given configuration.
    #[must_use]
    pub fn new(config: ActivityDetectorConfig) -> Self {
        Self {
            retention: TimeDelta::from_std(config.retention).unwrap_or(TimeDelta::MAX),
            window: TimeDelta::from_std(config.window).unwrap_or(TimeDelta::MAX),
            min_messages: config.min_messages,
            min_actors: config.min_actors,
            cooldown: TimeDelta::from_std(config.cooldown).unwrap_or(TimeDelta::MAX),
            trigger_chance: config.trigger_chance,
            states: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record a message from `actor` in `group` and decide whether to
    /// engage with the conversation.
    ///
    /// Engagement requires enough messages from enough distinct actors
    /// inside the evaluation window, an elapsed per-group cooldown, and a
    /// configured dice roll, checked in that order.
    pub async fn record(&self, group: &str, actor: &str, timestamp: DateTime<Utc>) -> bool {
        let mut states = self.states.write().await;
        let state = states.entry(group.to_string()).or_default();

        state.events.push_back((timestamp, actor.to_string()));

        let retention_cutoff = timestamp - self.retention;
        while state
            .events
            .front()
            .is_some_and(|&(ts, _)| ts < retention_cutoff)
        {
            state.events.pop_front();
        }

        let window_cutoff = timestamp - self.window;
        let mut messages = 0usize;
        let mut actors: HashSet<&str> = HashSet::new();
        for (ts, actor) in &state.events {
            if *ts >= window_cutoff {
                messages += 1;
                actors.insert(actor.as_str());
            }
        }

        if messages < self.min_messages || actors.len() < self.min_actors {
            return false;
        }

        if let Some(last) = state.last_trigger
            && timestamp - last < self.cooldown
        {
            return false;
        }

        if rand::random::<f64>() >= self.trigger_chance {
            return false;
        }

        state.last_trigger = Some(timestamp);
        true
    }

    /// Forget all state for a group.
    pub async fn reset(&self, group: &str) {
        let mut states = self.states.write().await;
        states.remove(group);
    }

    /// Drop groups whose newest event has aged out and whose cooldown has
    /// lapsed. Returns the number reaped.
    pub async fn cleanup(&self, now: DateTime<Utc>) -> usize {
        let event_cutoff = now - self.retention;
        let cooldown_cutoff = now - self.cooldown;

        let mut states = self.states.write().await;
        let before = states.len();
        states.retain(|_, state| {
            state
                .events
                .back()
                .is_some_and(|&(ts, _)| ts > event_cutoff)
                || state.last_trigger.is_some_and(|ts| ts > cooldown_cutoff)
        });
        before - states.len()
    }

    /// Number of groups currently tracked.
    pub async fn tracked_groups(&self) -> usize {
        self.states.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(trigger_chance: f64) -> ActivityDetector {
        ActivityDetector::new(ActivityDetectorConfig {
            trigger_chance,
            ..ActivityDetectorConfig::default()
        })
    }

    fn at(base: DateTime<Utc>, offset_secs: i64) -> DateTime<Utc> {
        base + TimeDelta::seconds(offset_secs)
    }

    /// Three actors, two messages each, inside the window.
    async fn drive_conversation(detector: &ActivityDetector, base: DateTime<Utc>) -> bool {
        let mut engaged = false;
        for (i, actor) in ["a", "b", "c", "a", "b", "c"].iter().enumerate() {
            engaged = detector
                .record("group-1", actor, at(base, i as i64))
                .await;
        }
        engaged
    }

    #[tokio::test]
    async fn test_multi_party_conversation_engages() {
        let detector = detector(1.0);
        let engaged = drive_conversation(&detector, Utc::now()).await;
        assert!(engaged);
    }

    #[tokio::test]
    async fn test_single_actor_flood_does_not_engage() {
        let detector = detector(1.0);
        let base = Utc::now();

        for i in 0..12 {
            let engaged = detector.record("group-1", "loner", at(base, i)).await;
            assert!(!engaged);
        }
    }

    #[tokio::test]
    async fn test_slow_trickle_does_not_engage() {
        let detector = detector(1.0);
        let base = Utc::now();

        // Six messages from three actors, but 25 seconds apart: never
        // enough inside the 20-second window.
        for (i, actor) in ["a", "b", "c", "a", "b", "c"].iter().enumerate() {
            let engaged = detector
                .record("group-1", actor, at(base, i as i64 * 25))
                .await;
            assert!(!engaged);
        }
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_repeat_trigger() {
        let detector = detector(1.0);
        let base = Utc::now();

        assert!(drive_conversation(&detector, base).await);

        // Conversation keeps going 10 seconds later: still on cooldown.
        let engaged = drive_conversation(&detector, at(base, 10)).await;
        assert!(!engaged);

        // Well past the 45-second cooldown it can trigger again.
        let engaged = drive_conversation(&detector, at(base, 70)).await;
        assert!(engaged);
    }

    #[tokio::test]
    async fn test_zero_chance_never_engages() {
        let detector = detector(0.0);
        let engaged = drive_conversation(&detector, Utc::now()).await;
        assert!(!engaged);
    }

    #[tokio::test]
    async fn test_reset_clears_group() {
        let detector = detector(1.0);
        let base = Utc::now();

        drive_conversation(&detector, base).await;
        detector.reset("group-1").await;
        assert_eq!(detector.tracked_groups().await, 0);

        // Fresh state: thresholds must be met from scratch.
        let engaged = detector.record("group-1", "a", at(base, 100)).await;
        assert!(!engaged);
    }

    #[tokio::test]
    async fn test_cleanup_reaps_idle_groups() {
        let detector = detector(1.0);
        let base = Utc::now();

        detector.record("stale", "a", base).await;
        detector.record("fresh", "a", at(base, 300)).await;
        assert_eq!(detector.tracked_groups().await, 2);

        let reaped = detector.cleanup(at(base, 301)).await;
        assert_eq!(reaped, 1);
        assert_eq!(detector.tracked_groups().await, 1);
    }
}
