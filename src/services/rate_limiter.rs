//! Rate limiter for conversational calls
//!
//! Every assistant-backed endpoint costs a model call. Calls are limited
//! per key (activity, participant or client address) within a sliding window.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use chrono::{DateTime, Duration, Utc};

use crate::config::PlannerConfig;

/// Sliding-window limiter keyed by conversation
pub struct ConversationRateLimiter {
    limit: usize,
    window: Duration,
    /// Call times by key
    calls: Arc<RwLock<HashMap<String, Vec<DateTime<Utc>>>>>,
}

impl ConversationRateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            calls: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn from_config(config: &PlannerConfig) -> Self {
        Self::new(
            config.conversation_limit,
            Duration::minutes(config.conversation_window_minutes),
        )
    }

    /// Record a call unless the key is limited. Returns whether the call
    /// may proceed.
    pub async fn try_acquire(&self, key: &str) -> bool {
        let mut calls = self.calls.write().await;
        let now = Utc::now();
        let cutoff = now - self.window;

        let key_calls = calls.entry(key.to_string()).or_default();
        key_calls.retain(|time| *time > cutoff);
        if key_calls.len() >= self.limit {
            return false;
        }
        key_calls.push(now);
        true
    }

    /// Clean up expired entries (should be called periodically)
    pub async fn cleanup(&self) {
        let cutoff = Utc::now() - self.window;
        let mut calls = self.calls.write().await;
        calls.retain(|_, times| {
            times.retain(|time| *time > cutoff);
            !times.is_empty()
        });
    }

    #[cfg(test)]
    async fn tracked_keys(&self) -> usize {
        self.calls.read().await.len()
    }
}
