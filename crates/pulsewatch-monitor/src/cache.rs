//! Read-through cache for upstream resource metadata.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pulsewatch_core::{CachedMetadata, CommentSource, MetadataStore, SourceError, StoreError};

/// Serves resource metadata from the store when fresh, refreshing from the
/// upstream on a miss or an expired entry. A failed refresh falls back to the
/// stale entry when one exists; the error only surfaces when there is nothing
/// at all to serve.
pub(crate) struct MetadataCache<C, S> {
    source: Arc<C>,
    store: Arc<S>,
    /// `None` disables expiry; cached entries are served until invalidated.
    ttl: Option<Duration>,
}

impl<C, S> MetadataCache<C, S>
where
    C: CommentSource,
    S: MetadataStore,
{
    pub fn new(source: Arc<C>, store: Arc<S>, ttl: Option<Duration>) -> Self {
        Self { source, store, ttl }
    }

    /// Look up metadata for `resource_id`, refreshing it when stale.
    pub async fn get(&self, resource_id: &str) -> Result<CachedMetadata, SourceError> {
        // A store read failure is treated as a miss; the upstream is still
        // reachable and the entry will be rewritten on the next refresh.
        let cached = match self.store.load_metadata(resource_id).await {
            Ok(entry) => entry,
            Err(error) => {
                tracing::warn!(resource_id, %error, "metadata cache read failed");
                None
            }
        };
        if let Some(entry) = &cached {
            if self.is_fresh(entry) {
                return Ok(entry.clone());
            }
        }

        match self.source.fetch_metadata(resource_id).await {
            Ok(metadata) => {
                let entry = CachedMetadata {
                    resource_id: resource_id.to_owned(),
                    title: metadata.title,
                    owner_name: metadata.owner_name,
                    fetched_at: Utc::now(),
                };
                if let Err(error) = self.store.save_metadata(&entry).await {
                    tracing::warn!(resource_id, %error, "metadata cache write failed");
                }
                Ok(entry)
            }
            Err(error) => match cached {
                Some(stale) => {
                    tracing::warn!(
                        resource_id,
                        %error,
                        fetched_at = %stale.fetched_at,
                        "metadata refresh failed, serving stale entry"
                    );
                    Ok(stale)
                }
                None => Err(error),
            },
        }
    }

    /// Drop the cached entry so the next [`Self::get`] refetches.
    pub async fn invalidate(&self, resource_id: &str) -> Result<(), StoreError> {
        self.store.delete_metadata(resource_id).await
    }

    fn is_fresh(&self, entry: &CachedMetadata) -> bool {
        match self.ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok()) {
            Some(ttl) => Utc::now() - entry.fetched_at <= ttl,
            None => true,
        }
    }
}
