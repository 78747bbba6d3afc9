//! Shared, lock-protected view of per-resource worker state.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Where a resource's worker currently is in its polling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PollState {
    Idle,
    Fetching,
    Scoring,
    Persisting,
    Evaluating,
    Backoff { until: DateTime<Utc> },
}

/// Operational status of one watched resource, as reported by the API.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatus {
    pub resource_id: String,
    pub added_at: DateTime<Utc>,
    pub poll_interval_secs: u64,
    #[serde(flatten)]
    pub state: PollState,
    /// Set when the resource is gone upstream or failures have pushed the
    /// backoff to its cap. The resource stays registered either way.
    pub degraded: bool,
    pub consecutive_failures: u32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Status map shared between workers and the query surface. Workers only
/// ever hold the lock for a field update, never across an await.
#[derive(Debug, Default)]
pub(crate) struct StatusBoard {
    entries: Mutex<HashMap<String, ResourceStatus>>,
}

impl StatusBoard {
    pub(crate) fn insert(&self, resource_id: &str, added_at: DateTime<Utc>, interval_secs: u64) {
        self.lock().insert(
            resource_id.to_owned(),
            ResourceStatus {
                resource_id: resource_id.to_owned(),
                added_at,
                poll_interval_secs: interval_secs,
                state: PollState::Idle,
                degraded: false,
                consecutive_failures: 0,
                last_success_at: None,
                last_error: None,
            },
        );
    }

    pub(crate) fn remove(&self, resource_id: &str) {
        self.lock().remove(resource_id);
    }

    pub(crate) fn set_state(&self, resource_id: &str, state: PollState) {
        self.update(resource_id, |entry| entry.state = state);
    }

    /// Interval reconfiguration; every other field is left alone.
    pub(crate) fn set_interval(&self, resource_id: &str, interval_secs: u64) {
        self.update(resource_id, |entry| entry.poll_interval_secs = interval_secs);
    }

    pub(crate) fn record_success(&self, resource_id: &str, at: DateTime<Utc>) {
        self.update(resource_id, |entry| {
            entry.state = PollState::Idle;
            entry.degraded = false;
            entry.consecutive_failures = 0;
            entry.last_success_at = Some(at);
            entry.last_error = None;
        });
    }

    pub(crate) fn record_failure(&self, resource_id: &str, error: &str, degraded: bool) {
        self.update(resource_id, |entry| {
            entry.consecutive_failures += 1;
            entry.degraded = entry.degraded || degraded;
            entry.last_error = Some(error.to_owned());
        });
    }

    pub(crate) fn get(&self, resource_id: &str) -> Option<ResourceStatus> {
        self.lock().get(resource_id).cloned()
    }

    pub(crate) fn snapshot(&self) -> Vec<ResourceStatus> {
        let mut statuses: Vec<ResourceStatus> = self.lock().values().cloned().collect();
        statuses.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
        statuses
    }

    fn update(&self, resource_id: &str, apply: impl FnOnce(&mut ResourceStatus)) {
        if let Some(entry) = self.lock().get_mut(resource_id) {
            apply(entry);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ResourceStatus>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
