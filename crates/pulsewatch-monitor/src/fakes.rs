//! Deterministic in-memory doubles for the source and store seams, used by
//! the cache, cycle, and scheduler tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use pulsewatch_core::{
    AlertEvent, CachedMetadata, CommentRecord, CommentSource, FetchedComment, MetadataStore,
    ResourceMetadata, SentimentSnapshot, SnapshotStore, SourceError, StoreError, StoredSnapshot,
};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// FakeSource
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SourceState {
    comment_scripts: HashMap<String, VecDeque<Result<Vec<FetchedComment>, SourceError>>>,
    metadata: HashMap<String, Result<ResourceMetadata, SourceError>>,
    comment_calls: HashMap<String, u32>,
    metadata_calls: HashMap<String, u32>,
    fetch_delay: Option<Duration>,
}

/// Scripted [`CommentSource`]: each comment fetch pops the next queued
/// response for the resource (empty queue yields no comments), metadata
/// fetches return a fixed per-resource result.
#[derive(Default)]
pub(crate) struct FakeSource {
    state: Mutex<SourceState>,
}

impl FakeSource {
    pub(crate) fn script_comments(
        &self,
        resource_id: &str,
        responses: Vec<Result<Vec<FetchedComment>, SourceError>>,
    ) {
        lock(&self.state)
            .comment_scripts
            .entry(resource_id.to_owned())
            .or_default()
            .extend(responses);
    }

    pub(crate) fn set_metadata(
        &self,
        resource_id: &str,
        result: Result<ResourceMetadata, SourceError>,
    ) {
        lock(&self.state)
            .metadata
            .insert(resource_id.to_owned(), result);
    }

    /// Delay every comment fetch, to hold a cycle in flight.
    pub(crate) fn set_fetch_delay(&self, delay: Duration) {
        lock(&self.state).fetch_delay = Some(delay);
    }

    pub(crate) fn comment_calls(&self, resource_id: &str) -> u32 {
        lock(&self.state)
            .comment_calls
            .get(resource_id)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn metadata_calls(&self, resource_id: &str) -> u32 {
        lock(&self.state)
            .metadata_calls
            .get(resource_id)
            .copied()
            .unwrap_or(0)
    }
}

impl CommentSource for FakeSource {
    async fn fetch_new_comments(
        &self,
        resource_id: &str,
        _since_comment_id: Option<&str>,
        _limit: u32,
    ) -> Result<Vec<FetchedComment>, SourceError> {
        let (delay, response) = {
            let mut state = lock(&self.state);
            *state
                .comment_calls
                .entry(resource_id.to_owned())
                .or_default() += 1;
            let response = state
                .comment_scripts
                .get_mut(resource_id)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Ok(Vec::new()));
            (state.fetch_delay, response)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        response
    }

    async fn fetch_metadata(&self, resource_id: &str) -> Result<ResourceMetadata, SourceError> {
        let mut state = lock(&self.state);
        *state
            .metadata_calls
            .entry(resource_id.to_owned())
            .or_default() += 1;
        state
            .metadata
            .get(resource_id)
            .cloned()
            .unwrap_or_else(|| {
                Err(SourceError::NotFound {
                    resource_id: resource_id.to_owned(),
                })
            })
    }
}

// ---------------------------------------------------------------------------
// FakeStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    snapshots: Vec<StoredSnapshot>,
    comments: Vec<CommentRecord>,
    seen_comment_keys: HashSet<(String, String)>,
    alerts: Vec<AlertEvent>,
    metadata: HashMap<String, CachedMetadata>,
    next_snapshot_id: i64,
    next_alert_id: i64,
    fail_next_append: bool,
}

/// In-memory [`SnapshotStore`] + [`MetadataStore`] mirroring the database's
/// dedupe and ordering behavior.
#[derive(Default)]
pub(crate) struct FakeStore {
    state: Mutex<StoreState>,
}

impl FakeStore {
    /// Make the next `append_cycle` fail once.
    pub(crate) fn fail_next_append(&self) {
        lock(&self.state).fail_next_append = true;
    }

    pub(crate) fn seed_metadata(&self, entry: CachedMetadata) {
        lock(&self.state)
            .metadata
            .insert(entry.resource_id.clone(), entry);
    }

    pub(crate) fn metadata(&self, resource_id: &str) -> Option<CachedMetadata> {
        lock(&self.state).metadata.get(resource_id).cloned()
    }

    pub(crate) fn snapshots(&self, resource_id: &str) -> Vec<StoredSnapshot> {
        lock(&self.state)
            .snapshots
            .iter()
            .filter(|s| s.snapshot.resource_id == resource_id)
            .cloned()
            .collect()
    }

    pub(crate) fn comment_count(&self, resource_id: &str) -> usize {
        lock(&self.state)
            .comments
            .iter()
            .filter(|c| c.resource_id == resource_id)
            .count()
    }

    pub(crate) fn alerts(&self, resource_id: &str) -> Vec<AlertEvent> {
        lock(&self.state)
            .alerts
            .iter()
            .filter(|a| a.resource_id == resource_id)
            .cloned()
            .collect()
    }
}

impl SnapshotStore for FakeStore {
    async fn append_cycle(
        &self,
        comments: &[CommentRecord],
        snapshot: &SentimentSnapshot,
    ) -> Result<i64, StoreError> {
        let mut state = lock(&self.state);
        if state.fail_next_append {
            state.fail_next_append = false;
            return Err(StoreError::Persistence {
                reason: "injected append failure".to_owned(),
            });
        }
        for comment in comments {
            let key = (comment.resource_id.clone(), comment.comment_id.clone());
            if state.seen_comment_keys.insert(key) {
                state.comments.push(comment.clone());
            }
        }
        state.next_snapshot_id += 1;
        let id = state.next_snapshot_id;
        state.snapshots.push(StoredSnapshot {
            id,
            snapshot: snapshot.clone(),
        });
        Ok(id)
    }

    async fn latest_snapshot(&self, resource_id: &str) -> Result<Option<StoredSnapshot>, StoreError> {
        Ok(lock(&self.state)
            .snapshots
            .iter()
            .filter(|s| s.snapshot.resource_id == resource_id)
            .max_by_key(|s| (s.snapshot.taken_at, s.id))
            .cloned())
    }

    async fn latest_comment_id(&self, resource_id: &str) -> Result<Option<String>, StoreError> {
        Ok(lock(&self.state)
            .comments
            .iter()
            .filter(|c| c.resource_id == resource_id)
            .max_by_key(|c| c.published_at)
            .map(|c| c.comment_id.clone()))
    }

    async fn history(
        &self,
        resource_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredSnapshot>, StoreError> {
        let mut rows: Vec<StoredSnapshot> = lock(&self.state)
            .snapshots
            .iter()
            .filter(|s| {
                s.snapshot.resource_id == resource_id
                    && s.snapshot.taken_at >= from
                    && s.snapshot.taken_at <= to
            })
            .cloned()
            .collect();
        rows.sort_by_key(|s| (s.snapshot.taken_at, s.id));
        Ok(rows)
    }

    async fn append_alert(&self, event: &AlertEvent) -> Result<i64, StoreError> {
        let mut state = lock(&self.state);
        state.next_alert_id += 1;
        state.alerts.push(event.clone());
        Ok(state.next_alert_id)
    }

    async fn recent_alerts(
        &self,
        resource_id: &str,
        within: Duration,
    ) -> Result<Vec<AlertEvent>, StoreError> {
        let cutoff = chrono::Duration::from_std(within)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .unwrap_or(DateTime::UNIX_EPOCH);
        let mut rows: Vec<AlertEvent> = lock(&self.state)
            .alerts
            .iter()
            .filter(|a| a.resource_id == resource_id && a.raised_at >= cutoff)
            .cloned()
            .collect();
        rows.sort_by_key(|a| std::cmp::Reverse(a.raised_at));
        Ok(rows)
    }
}

impl MetadataStore for FakeStore {
    async fn load_metadata(&self, resource_id: &str) -> Result<Option<CachedMetadata>, StoreError> {
        Ok(lock(&self.state).metadata.get(resource_id).cloned())
    }

    async fn save_metadata(&self, entry: &CachedMetadata) -> Result<(), StoreError> {
        lock(&self.state)
            .metadata
            .insert(entry.resource_id.clone(), entry.clone());
        Ok(())
    }

    async fn delete_metadata(&self, resource_id: &str) -> Result<(), StoreError> {
        lock(&self.state).metadata.remove(resource_id);
        Ok(())
    }
}
