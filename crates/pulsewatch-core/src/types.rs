use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Sentiment tiers
// ---------------------------------------------------------------------------

/// One of five ordered sentiment categories derived from a polarity score.
///
/// The boundary table is a core design decision (not the scorer's) and is
/// reproduced exactly, including the closed/open interval choices, so tier
/// counts stay reproducible across releases:
///
/// | Tier | Polarity |
/// |---|---|
/// | very-negative | `< -0.5` |
/// | negative | `[-0.5, -0.1)` |
/// | neutral | `[-0.1, 0.1]` |
/// | positive | `(0.1, 0.5]` |
/// | very-positive | `> 0.5` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentTier {
    VeryNegative,
    Negative,
    Neutral,
    Positive,
    VeryPositive,
}

impl SentimentTier {
    /// Map a polarity score in `[-1, 1]` to its tier.
    #[must_use]
    pub fn from_polarity(polarity: f64) -> Self {
        if polarity < -0.5 {
            Self::VeryNegative
        } else if polarity < -0.1 {
            Self::Negative
        } else if polarity <= 0.1 {
            Self::Neutral
        } else if polarity <= 0.5 {
            Self::Positive
        } else {
            Self::VeryPositive
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VeryNegative => "very_negative",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
            Self::Positive => "positive",
            Self::VeryPositive => "very_positive",
        }
    }
}

impl FromStr for SentimentTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "very_negative" => Ok(Self::VeryNegative),
            "negative" => Ok(Self::Negative),
            "neutral" => Ok(Self::Neutral),
            "positive" => Ok(Self::Positive),
            "very_positive" => Ok(Self::VeryPositive),
            other => Err(format!("unknown sentiment tier: {other}")),
        }
    }
}

/// Per-tier comment counts for one snapshot. Counts sum to the snapshot's
/// `sample_size`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub very_negative: i64,
    pub negative: i64,
    pub neutral: i64,
    pub positive: i64,
    pub very_positive: i64,
}

impl TierCounts {
    /// Increment the count for `tier`.
    pub fn record(&mut self, tier: SentimentTier) {
        match tier {
            SentimentTier::VeryNegative => self.very_negative += 1,
            SentimentTier::Negative => self.negative += 1,
            SentimentTier::Neutral => self.neutral += 1,
            SentimentTier::Positive => self.positive += 1,
            SentimentTier::VeryPositive => self.very_positive += 1,
        }
    }

    #[must_use]
    pub fn sum(&self) -> i64 {
        self.very_negative + self.negative + self.neutral + self.positive + self.very_positive
    }
}

// ---------------------------------------------------------------------------
// Watch list
// ---------------------------------------------------------------------------

/// One externally-hosted item being tracked. Owned by the poll scheduler's
/// registry; never persisted (the watch list is config/API driven).
#[derive(Debug, Clone, Serialize)]
pub struct MonitoredResource {
    pub resource_id: String,
    pub added_at: DateTime<Utc>,
    pub poll_interval_secs: u64,
}

// ---------------------------------------------------------------------------
// Upstream payloads
// ---------------------------------------------------------------------------

/// One comment as returned by the resource client, normalized but not yet
/// scored.
#[derive(Debug, Clone)]
pub struct FetchedComment {
    pub comment_id: String,
    pub text: String,
    pub author: String,
    pub like_count: i64,
    pub reply_count: i64,
    pub published_at: DateTime<Utc>,
}

/// Descriptive metadata for a resource, as fetched from upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMetadata {
    pub title: String,
    pub owner_name: String,
}

/// A metadata cache row: [`ResourceMetadata`] plus its freshness timestamp.
/// Overwritten whenever a fresh fetch succeeds.
#[derive(Debug, Clone, Serialize)]
pub struct CachedMetadata {
    pub resource_id: String,
    pub title: String,
    pub owner_name: String,
    pub fetched_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Persisted records
// ---------------------------------------------------------------------------

/// One externally-authored comment observed during a polling cycle, scored.
/// Immutable once written; deduplicated on `(resource_id, comment_id)` at
/// write time.
#[derive(Debug, Clone, Serialize)]
pub struct CommentRecord {
    pub comment_id: String,
    pub resource_id: String,
    pub text: String,
    pub author: String,
    pub like_count: i64,
    pub reply_count: i64,
    pub published_at: DateTime<Utc>,
    pub observed_at: DateTime<Utc>,
    /// Polarity score in `[-1, 1]`.
    pub polarity: f64,
    pub tier: SentimentTier,
}

/// One aggregate sentiment measurement of a resource at a point in time.
///
/// Invariant: `sample_size == tier_counts.sum()`. Created once per successful
/// polling cycle; the `taken_at`-ascending sequence per resource is the
/// authoritative history.
#[derive(Debug, Clone, Serialize)]
pub struct SentimentSnapshot {
    pub resource_id: String,
    pub taken_at: DateTime<Utc>,
    pub sample_size: i64,
    pub mean_polarity: f64,
    pub tier_counts: TierCounts,
}

/// A snapshot as read back from the store, carrying its generated row id.
#[derive(Debug, Clone, Serialize)]
pub struct StoredSnapshot {
    pub id: i64,
    #[serde(flatten)]
    pub snapshot: SentimentSnapshot,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// The detected condition kinds the alert evaluator can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    SustainedNegative,
    SustainedPositive,
    SentimentDrop,
    SentimentRise,
}

impl AlertKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SustainedNegative => "sustained_negative",
            Self::SustainedPositive => "sustained_positive",
            Self::SentimentDrop => "sentiment_drop",
            Self::SentimentRise => "sentiment_rise",
        }
    }
}

impl FromStr for AlertKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sustained_negative" => Ok(Self::SustainedNegative),
            "sustained_positive" => Ok(Self::SustainedPositive),
            "sentiment_drop" => Ok(Self::SentimentDrop),
            "sentiment_rise" => Ok(Self::SentimentRise),
            other => Err(format!("unknown alert kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl AlertSeverity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warning" => Ok(Self::Warning),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown alert severity: {other}")),
        }
    }
}

/// A detected sentiment condition. Created by the alert evaluator, persisted
/// by the snapshot store. `resolved` is the only mutable field, flipped by an
/// external acknowledgement; rows are never deleted.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub resource_id: String,
    pub raised_at: DateTime<Utc>,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    /// The configured threshold that was breached.
    pub threshold: f64,
    /// The observed value (mean polarity or polarity delta) that breached it.
    pub observed: f64,
    pub triggering_snapshot_id: i64,
    pub resolved: bool,
}

// ---------------------------------------------------------------------------
// Alert thresholds
// ---------------------------------------------------------------------------

/// The four configured alert thresholds, passed explicitly into the evaluator
/// at construction. Defaults are operational starting points, not contract.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    /// `sustained_negative` fires when `mean_polarity < negative_threshold`.
    pub negative_threshold: f64,
    /// `sustained_positive` fires when `mean_polarity > positive_threshold`.
    pub positive_threshold: f64,
    /// `sentiment_drop` fires when the mean falls by at least this much.
    pub drop_threshold: f64,
    /// `sentiment_rise` fires when the mean rises by at least this much.
    pub rise_threshold: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            negative_threshold: -0.3,
            positive_threshold: 0.5,
            drop_threshold: 0.2,
            rise_threshold: 0.2,
        }
    }
}
