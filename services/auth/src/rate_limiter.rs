//! Failed-attempt limiter for verification code confirmation
//!
//! Six digits are cheap to enumerate, so confirmation attempts are counted
//! per email. Once `max_attempts` attempts land inside one window without a
//! success the key is locked until that window, counted from the first
//! attempt, has passed.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::clock::Clock;

/// Attempt limiter configuration
#[derive(Debug, Clone)]
pub struct AttemptLimiterConfig {
    /// Failures tolerated per window
    pub max_attempts: u32,
    /// Window length, counted from the first failure
    pub window: Duration,
}

impl Default for AttemptLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::minutes(5),
        }
    }
}

#[derive(Debug)]
struct AttemptEntry {
    failures: u32,
    window_start: DateTime<Utc>,
}

/// Attempt limiter
#[derive(Debug, Clone)]
pub struct AttemptLimiter {
    config: AttemptLimiterConfig,
    clock: Arc<dyn Clock>,
    entries: Arc<Mutex<HashMap<String, AttemptEntry>>>,
}

impl AttemptLimiter {
    pub fn new(config: AttemptLimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Reserve one attempt for `key`
    ///
    /// The attempt is counted as a failure up front, so concurrent callers
    /// cannot all slip past the check before any failure lands. A caller that
    /// succeeds gives the budget back with [`reset`](Self::reset). Returns
    /// false once `max_attempts` attempts have been spent inside the window.
    pub async fn try_acquire(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let now = self.clock.now();
        let window = self.config.window;

        entries.retain(|_, entry| now - entry.window_start < window);

        let entry = entries.entry(key.to_string()).or_insert(AttemptEntry {
            failures: 0,
            window_start: now,
        });

        if entry.failures >= self.config.max_attempts {
            return false;
        }

        entry.failures += 1;
        if entry.failures == self.config.max_attempts {
            warn!(
                "Locked verification attempts for {} after {} failures",
                key, entry.failures
            );
        }
        true
    }

    /// Forget every failure recorded for `key`
    pub async fn reset(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    /// Get the limiter configuration
    pub fn config(&self) -> &AttemptLimiterConfig {
        &self.config
    }
}
