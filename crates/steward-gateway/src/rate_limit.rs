//! Outbound message throttling.
//!
//! Two rules, checked and updated under one lock:
//! a global minimum spacing between any two sends, and a per-target counter
//! with a per-minute ceiling (separate ceilings for groups and users).
//! A target's counter resets lazily once more than a minute has passed since
//! that target's last send. Denied sends are dropped, never queued.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use steward_core::config::SafetyConfig;

const WINDOW: Duration = Duration::from_secs(60);

/// Why a send was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denied {
    /// Too soon after the previous send to any target.
    Spacing,
    /// The target used up its per-minute quota.
    Quota,
}

/// Per-target counter.
struct Bucket {
    count: u32,
    last_send: Instant,
}

struct LimiterState {
    last_send: Option<Instant>,
    buckets: HashMap<(i64, bool), Bucket>,
}

pub struct RateLimiter {
    enabled: bool,
    min_interval: Duration,
    group_limit: u32,
    private_limit: u32,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(safety: &SafetyConfig) -> Self {
        Self {
            enabled: safety.enable_msg_limit,
            min_interval: Duration::from_millis(safety.msg_interval_ms),
            group_limit: safety.group_msg_limit,
            private_limit: safety.private_msg_limit,
            state: Mutex::new(LimiterState {
                last_send: None,
                buckets: HashMap::new(),
            }),
        }
    }

    /// Claim a send slot for `target_id` now.
    pub fn try_acquire(&self, target_id: i64, is_group: bool) -> bool {
        self.check_at(target_id, is_group, Instant::now()).is_ok()
    }

    /// Claim a send slot at an explicit instant.
    pub fn check_at(&self, target_id: i64, is_group: bool, now: Instant) -> Result<(), Denied> {
        if !self.enabled {
            return Ok(());
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(last) = state.last_send
            && now.saturating_duration_since(last) < self.min_interval
        {
            return Err(Denied::Spacing);
        }

        let limit = if is_group {
            self.group_limit
        } else {
            self.private_limit
        };
        let bucket = state
            .buckets
            .entry((target_id, is_group))
            .or_insert(Bucket {
                count: 0,
                last_send: now,
            });
        if now.saturating_duration_since(bucket.last_send) > WINDOW {
            bucket.count = 0;
        }
        if bucket.count >= limit {
            return Err(Denied::Quota);
        }
        bucket.count += 1;
        bucket.last_send = now;
        state.last_send = Some(now);
        Ok(())
    }

    /// Sends recorded for a target in its current window.
    pub fn sent_count(&self, target_id: i64, is_group: bool) -> u32 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .buckets
            .get(&(target_id, is_group))
            .map(|b| b.count)
            .unwrap_or(0)
    }
}
