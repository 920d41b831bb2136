//! Per-identity message-rate tracking.
//!
//! Answers "is this identity posting faster than allowed right now" on the
//! synchronous message path, so every call does bounded in-memory work and
//! nothing else.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use guildest_common::TrackerConfig;
use tokio::sync::RwLock;

/// Rate tracker configuration.
#[derive(Debug, Clone)]
pub struct RateTrackerConfig {
    /// Trailing window over which events are counted.
    pub window: Duration,
    /// Events within the window above which the identity is over the limit.
    pub threshold: usize,
}

impl Default for RateTrackerConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(10),
            threshold: 20,
        }
    }
}

impl From<&TrackerConfig> for RateTrackerConfig {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            window: Duration::from_secs(config.rate_window_secs),
            threshold: config.rate_threshold,
        }
    }
}

/// Per-identity sliding-window event counter.
#[derive(Clone)]
pub struct RateTracker {
    window: TimeDelta,
    threshold: usize,
    states: Arc<RwLock<HashMap<String, VecDeque<DateTime<Utc>>>>>,
}

impl RateTracker {
    /// Create a tracker with the given configuration.
    #[must_use]
    pub fn new(config: RateTrackerConfig) -> Self {
        Self {
            window: TimeDelta::from_std(config.window).unwrap_or(TimeDelta::MAX),
            threshold: config.threshold,
            states: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record an event for `identity` at `timestamp` and report whether the
    /// identity is over the limit, together with the count of events inside
    /// the trailing window.
    ///
    /// Entries that aged out of the window are evicted from the front in
    /// bulk, so the amortized cost per call is constant.
    pub async fn check(&self, identity: &str, timestamp: DateTime<Utc>) -> (bool, usize) {
        let cutoff = timestamp - self.window;

        let mut states = self.states.write().await;
        let window = states.entry(identity.to_string()).or_default();

        while window.front().is_some_and(|&ts| ts <= cutoff) {
            window.pop_front();
        }
        window.push_back(timestamp);

        let count = window.len();
        (count > self.threshold, count)
    }

    /// Forget all history for an identity, e.g. after a corrective action,
    /// so the next `check` starts from a clean window.
    pub async fn reset(&self, identity: &str) {
        let mut states = self.states.write().await;
        states.remove(identity);
    }

    /// Drop identities whose newest event has aged out of the window; their
    /// state carries no signal anymore. Returns the number reaped.
    pub async fn cleanup(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        let mut states = self.states.write().await;
        let before = states.len();
        states.retain(|_, window| window.back().is_some_and(|&ts| ts > cutoff));
        before - states.len()
    }

    /// Number of identities currently tracked.
    pub async fn tracked_identities(&self) -> usize {
        self.states.read().await.len()
    }
}
