//! Join requests parked for an operator decision, keyed by gateway flag.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Local};
use serde::Serialize;

/// How long a parked request is kept before `cleanup_expired` drops it.
pub const SUSPEND_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Suspended,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingGroupRequest {
    pub group_id: i64,
    pub user_id: i64,
    pub flag: String,
    pub comment: String,
    /// Why the request was held.
    pub reason: String,
    pub received_at: DateTime<Local>,
    pub status: RequestStatus,
}

impl PendingGroupRequest {
    pub fn age(&self, now: DateTime<Local>) -> Duration {
        now - self.received_at
    }
}

/// Counts of parked requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestStats {
    pub total: usize,
    pub per_group: BTreeMap<i64, usize>,
}

#[derive(Debug, Default)]
pub struct SuspendedRegistry {
    entries: Mutex<HashMap<String, PendingGroupRequest>>,
}

impl SuspendedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a request. A repeated flag replaces the older entry.
    pub fn insert(&self, request: PendingGroupRequest) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(request.flag.clone(), request);
    }

    pub fn get(&self, flag: &str) -> Option<PendingGroupRequest> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(flag).cloned()
    }

    pub fn remove(&self, flag: &str) -> Option<PendingGroupRequest> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(flag)
    }

    /// All parked requests, oldest first.
    pub fn list(&self) -> Vec<PendingGroupRequest> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<_> = entries.values().cloned().collect();
        list.sort_by_key(|r| r.received_at);
        list
    }

    pub fn for_group(&self, group_id: i64) -> Vec<PendingGroupRequest> {
        self.list()
            .into_iter()
            .filter(|r| r.group_id == group_id)
            .collect()
    }

    /// Drop entries older than the TTL. Returns how many were dropped.
    pub fn cleanup_expired_at(&self, now: DateTime<Local>) -> usize {
        let ttl = Duration::days(SUSPEND_TTL_DAYS);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, r| r.age(now) <= ttl);
        before - entries.len()
    }

    pub fn stats(&self) -> RequestStats {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut stats = RequestStats {
            total: entries.len(),
            ..RequestStats::default()
        };
        for r in entries.values() {
            *stats.per_group.entry(r.group_id).or_default() += 1;
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
