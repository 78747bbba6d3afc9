//! Shared domain types, error taxonomy, and component traits for pulsewatch.
//!
//! Everything the monitoring engine's components agree on lives here: the
//! persisted record shapes, the sentiment tier boundary table, the alert
//! vocabulary, and the async traits that let the scheduler run against either
//! the real client/store or deterministic fakes in tests.

mod app_config;
mod config;
mod error;
mod traits;
mod types;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use error::{ConfigError, SourceError, StoreError};
pub use traits::{CommentSource, MetadataStore, SentimentScorer, SnapshotStore};
pub use types::{
    AlertEvent, AlertKind, AlertSeverity, AlertThresholds, CachedMetadata, CommentRecord,
    FetchedComment, MonitoredResource, ResourceMetadata, SentimentSnapshot, SentimentTier,
    StoredSnapshot, TierCounts,
};
