//! Store trait implementations over Postgres.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use pulsewatch_core::{
    AlertEvent, AlertKind, AlertSeverity, CachedMetadata, CommentRecord, MetadataStore,
    SentimentSnapshot, SnapshotStore, StoreError, StoredSnapshot, TierCounts,
};

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `sentiment_history` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SnapshotRow {
    pub id: i64,
    pub resource_id: String,
    pub taken_at: DateTime<Utc>,
    pub sample_size: i64,
    pub mean_polarity: f64,
    pub very_negative_count: i64,
    pub negative_count: i64,
    pub neutral_count: i64,
    pub positive_count: i64,
    pub very_positive_count: i64,
}

impl From<SnapshotRow> for StoredSnapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            id: row.id,
            snapshot: SentimentSnapshot {
                resource_id: row.resource_id,
                taken_at: row.taken_at,
                sample_size: row.sample_size,
                mean_polarity: row.mean_polarity,
                tier_counts: TierCounts {
                    very_negative: row.very_negative_count,
                    negative: row.negative_count,
                    neutral: row.neutral_count,
                    positive: row.positive_count,
                    very_positive: row.very_positive_count,
                },
            },
        }
    }
}

/// A row from the `alerts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlertRow {
    pub id: i64,
    pub resource_id: String,
    pub raised_at: DateTime<Utc>,
    pub kind: String,
    pub severity: String,
    pub message: String,
    pub threshold: f64,
    pub observed: f64,
    pub triggering_snapshot_id: i64,
    pub resolved: bool,
}

impl AlertRow {
    /// Convert to the core event type, parsing the stored kind/severity.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::CorruptRow`] if the stored kind or severity is not
    /// a known variant.
    pub fn into_event(self) -> Result<AlertEvent, DbError> {
        let kind: AlertKind = self.kind.parse().map_err(DbError::CorruptRow)?;
        let severity: AlertSeverity = self.severity.parse().map_err(DbError::CorruptRow)?;
        Ok(AlertEvent {
            resource_id: self.resource_id,
            raised_at: self.raised_at,
            kind,
            severity,
            message: self.message,
            threshold: self.threshold,
            observed: self.observed,
            triggering_snapshot_id: self.triggering_snapshot_id,
            resolved: self.resolved,
        })
    }
}

// ---------------------------------------------------------------------------
// PgStore
// ---------------------------------------------------------------------------

/// The Postgres-backed snapshot store and metadata cache store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// List alert rows (with ids, for the query surface) for a resource
    /// raised at or after `cutoff`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlx`] if the query fails.
    pub async fn list_alert_rows(
        &self,
        resource_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<AlertRow>, DbError> {
        let rows = sqlx::query_as::<_, AlertRow>(
            "SELECT id, resource_id, raised_at, kind, severity, message, threshold, observed, \
                    triggering_snapshot_id, resolved \
             FROM alerts \
             WHERE resource_id = $1 AND raised_at >= $2 \
             ORDER BY raised_at DESC, id DESC",
        )
        .bind(resource_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Flip an alert's `resolved` flag to true.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if no alert with `alert_id` exists,
    /// [`DbError::Sqlx`] if the update fails.
    pub async fn resolve_alert(&self, alert_id: i64) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE alerts SET resolved = TRUE WHERE id = $1")
            .bind(alert_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Snapshot rows for a resource within `[from, to]`, ascending `taken_at`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlx`] if the query fails.
    pub async fn list_snapshot_rows(
        &self,
        resource_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SnapshotRow>, DbError> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            "SELECT id, resource_id, taken_at, sample_size, mean_polarity, \
                    very_negative_count, negative_count, neutral_count, \
                    positive_count, very_positive_count \
             FROM sentiment_history \
             WHERE resource_id = $1 AND taken_at >= $2 AND taken_at <= $3 \
             ORDER BY taken_at ASC, id ASC",
        )
        .bind(resource_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

fn persistence(e: impl std::fmt::Display) -> StoreError {
    StoreError::Persistence {
        reason: e.to_string(),
    }
}

/// Converts a std `Duration` window into a lookback cutoff timestamp.
/// Windows too large to represent fall back to the epoch (everything
/// matches).
fn window_cutoff(within: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(within)
        .ok()
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

impl SnapshotStore for PgStore {
    /// One transaction: comment inserts (deduplicated via
    /// `ON CONFLICT DO NOTHING` on `(resource_id, comment_id)`) plus exactly
    /// one history row. A failure rolls the whole cycle back, so the stored
    /// history never reflects a partially applied cycle.
    async fn append_cycle(
        &self,
        comments: &[CommentRecord],
        snapshot: &SentimentSnapshot,
    ) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(persistence)?;

        for comment in comments {
            sqlx::query(
                "INSERT INTO comment_snapshots \
                     (resource_id, comment_id, text, author, like_count, reply_count, \
                      published_at, observed_at, polarity, tier) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                 ON CONFLICT (resource_id, comment_id) DO NOTHING",
            )
            .bind(&comment.resource_id)
            .bind(&comment.comment_id)
            .bind(&comment.text)
            .bind(&comment.author)
            .bind(comment.like_count)
            .bind(comment.reply_count)
            .bind(comment.published_at)
            .bind(comment.observed_at)
            .bind(comment.polarity)
            .bind(comment.tier.as_str())
            .execute(&mut *tx)
            .await
            .map_err(persistence)?;
        }

        let snapshot_id: i64 = sqlx::query_scalar(
            "INSERT INTO sentiment_history \
                 (resource_id, taken_at, sample_size, mean_polarity, \
                  very_negative_count, negative_count, neutral_count, \
                  positive_count, very_positive_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING id",
        )
        .bind(&snapshot.resource_id)
        .bind(snapshot.taken_at)
        .bind(snapshot.sample_size)
        .bind(snapshot.mean_polarity)
        .bind(snapshot.tier_counts.very_negative)
        .bind(snapshot.tier_counts.negative)
        .bind(snapshot.tier_counts.neutral)
        .bind(snapshot.tier_counts.positive)
        .bind(snapshot.tier_counts.very_positive)
        .fetch_one(&mut *tx)
        .await
        .map_err(persistence)?;

        tx.commit().await.map_err(persistence)?;
        Ok(snapshot_id)
    }

    async fn latest_snapshot(
        &self,
        resource_id: &str,
    ) -> Result<Option<StoredSnapshot>, StoreError> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT id, resource_id, taken_at, sample_size, mean_polarity, \
                    very_negative_count, negative_count, neutral_count, \
                    positive_count, very_positive_count \
             FROM sentiment_history \
             WHERE resource_id = $1 \
             ORDER BY taken_at DESC, id DESC \
             LIMIT 1",
        )
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(row.map(Into::into))
    }

    async fn latest_comment_id(&self, resource_id: &str) -> Result<Option<String>, StoreError> {
        sqlx::query_scalar::<_, String>(
            "SELECT comment_id \
             FROM comment_snapshots \
             WHERE resource_id = $1 \
             ORDER BY published_at DESC, id DESC \
             LIMIT 1",
        )
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)
    }

    async fn history(
        &self,
        resource_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredSnapshot>, StoreError> {
        let rows = self
            .list_snapshot_rows(resource_id, from, to)
            .await
            .map_err(persistence)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn append_alert(&self, event: &AlertEvent) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO alerts \
                 (resource_id, raised_at, kind, severity, message, threshold, observed, \
                  triggering_snapshot_id, resolved) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING id",
        )
        .bind(&event.resource_id)
        .bind(event.raised_at)
        .bind(event.kind.as_str())
        .bind(event.severity.as_str())
        .bind(&event.message)
        .bind(event.threshold)
        .bind(event.observed)
        .bind(event.triggering_snapshot_id)
        .bind(event.resolved)
        .fetch_one(&self.pool)
        .await
        .map_err(persistence)
    }

    async fn recent_alerts(
        &self,
        resource_id: &str,
        within: Duration,
    ) -> Result<Vec<AlertEvent>, StoreError> {
        let rows = self
            .list_alert_rows(resource_id, window_cutoff(within))
            .await
            .map_err(persistence)?;
        rows.into_iter()
            .map(|row| row.into_event().map_err(persistence))
            .collect()
    }
}

impl MetadataStore for PgStore {
    async fn load_metadata(&self, resource_id: &str) -> Result<Option<CachedMetadata>, StoreError> {
        #[derive(sqlx::FromRow)]
        struct MetadataRow {
            resource_id: String,
            title: String,
            owner_name: String,
            fetched_at: DateTime<Utc>,
        }

        let row = sqlx::query_as::<_, MetadataRow>(
            "SELECT resource_id, title, owner_name, fetched_at \
             FROM metadata_cache \
             WHERE resource_id = $1",
        )
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)?;

        Ok(row.map(|r| CachedMetadata {
            resource_id: r.resource_id,
            title: r.title,
            owner_name: r.owner_name,
            fetched_at: r.fetched_at,
        }))
    }

    async fn save_metadata(&self, entry: &CachedMetadata) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO metadata_cache (resource_id, title, owner_name, fetched_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (resource_id) DO UPDATE \
                 SET title = EXCLUDED.title, \
                     owner_name = EXCLUDED.owner_name, \
                     fetched_at = EXCLUDED.fetched_at",
        )
        .bind(&entry.resource_id)
        .bind(&entry.title)
        .bind(&entry.owner_name)
        .bind(entry.fetched_at)
        .execute(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(())
    }

    async fn delete_metadata(&self, resource_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM metadata_cache WHERE resource_id = $1")
            .bind(resource_id)
            .execute(&self.pool)
            .await
            .map_err(persistence)?;
        Ok(())
    }
}
