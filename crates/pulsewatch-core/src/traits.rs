//! Component seams of the monitoring engine.
//!
//! The scheduler is generic over these traits so its state machine can be
//! driven in tests by deterministic in-memory fakes, with the network and the
//! database as the only suspension points in production.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{SourceError, StoreError};
use crate::types::{
    AlertEvent, CachedMetadata, CommentRecord, FetchedComment, ResourceMetadata, SentimentSnapshot,
    StoredSnapshot,
};

/// The pure text → polarity collaborator. Implementations must be cheap and
/// synchronous; the engine never awaits scoring.
pub trait SentimentScorer: Send + Sync {
    /// Score `text`, returning a polarity in `[-1, 1]`.
    fn score(&self, text: &str) -> f64;
}

/// Wraps the upstream comment/metadata API.
pub trait CommentSource: Send + Sync {
    /// Fetch comments for `resource_id` newer than `since_comment_id`
    /// (exclusive), up to `limit`, normalized to ascending `published_at`
    /// order. With `since_comment_id == None` the newest `limit` comments are
    /// returned.
    fn fetch_new_comments(
        &self,
        resource_id: &str,
        since_comment_id: Option<&str>,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<FetchedComment>, SourceError>> + Send;

    /// Fetch descriptive metadata for `resource_id`.
    fn fetch_metadata(
        &self,
        resource_id: &str,
    ) -> impl Future<Output = Result<ResourceMetadata, SourceError>> + Send;
}

/// Append-only, time-indexed persistence of cycles and alerts.
pub trait SnapshotStore: Send + Sync {
    /// Atomically persist the cycle's comment records (deduplicated on
    /// `(resource_id, comment_id)`) and exactly one snapshot. Either both are
    /// durable or neither is. Returns the snapshot's generated id.
    fn append_cycle(
        &self,
        comments: &[CommentRecord],
        snapshot: &SentimentSnapshot,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;

    /// The most recent snapshot for `resource_id`, if any.
    fn latest_snapshot(
        &self,
        resource_id: &str,
    ) -> impl Future<Output = Result<Option<StoredSnapshot>, StoreError>> + Send;

    /// The id of the most recently published stored comment for
    /// `resource_id`. Feeds incremental fetching across restarts.
    fn latest_comment_id(
        &self,
        resource_id: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Snapshots for `resource_id` within `[from, to]`, ascending `taken_at`.
    fn history(
        &self,
        resource_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<StoredSnapshot>, StoreError>> + Send;

    /// Persist one alert event, returning its generated id.
    fn append_alert(
        &self,
        event: &AlertEvent,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;

    /// Alerts for `resource_id` raised within the trailing `within` window,
    /// newest first.
    fn recent_alerts(
        &self,
        resource_id: &str,
        within: Duration,
    ) -> impl Future<Output = Result<Vec<AlertEvent>, StoreError>> + Send;
}

/// Backing store for the metadata cache table. One row per resource id,
/// overwritten on refresh.
pub trait MetadataStore: Send + Sync {
    fn load_metadata(
        &self,
        resource_id: &str,
    ) -> impl Future<Output = Result<Option<CachedMetadata>, StoreError>> + Send;

    fn save_metadata(
        &self,
        entry: &CachedMetadata,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn delete_metadata(
        &self,
        resource_id: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
