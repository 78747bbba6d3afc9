//! Turns a cycle's fetched comments into scored records and one snapshot.

use chrono::{DateTime, Utc};
use pulsewatch_core::{
    CommentRecord, FetchedComment, SentimentScorer, SentimentSnapshot, SentimentTier, TierCounts,
};

/// Score `comments` and fold them into per-comment records plus the cycle's
/// aggregate snapshot. The snapshot's `sample_size` always equals the sum of
/// its tier counts because both are derived from the same pass.
#[must_use]
pub(crate) fn score_cycle(
    scorer: &dyn SentimentScorer,
    resource_id: &str,
    comments: Vec<FetchedComment>,
    observed_at: DateTime<Utc>,
) -> (Vec<CommentRecord>, SentimentSnapshot) {
    let mut records = Vec::with_capacity(comments.len());
    let mut tier_counts = TierCounts::default();
    let mut polarity_sum = 0.0;

    for comment in comments {
        let polarity = scorer.score(&comment.text);
        let tier = SentimentTier::from_polarity(polarity);
        tier_counts.record(tier);
        polarity_sum += polarity;
        records.push(CommentRecord {
            comment_id: comment.comment_id,
            resource_id: resource_id.to_owned(),
            text: comment.text,
            author: comment.author,
            like_count: comment.like_count,
            reply_count: comment.reply_count,
            published_at: comment.published_at,
            observed_at,
            polarity,
            tier,
        });
    }

    let sample_size = tier_counts.sum();
    #[allow(clippy::cast_precision_loss)]
    let mean_polarity = if sample_size == 0 {
        0.0
    } else {
        polarity_sum / sample_size as f64
    };

    let snapshot = SentimentSnapshot {
        resource_id: resource_id.to_owned(),
        taken_at: observed_at,
        sample_size,
        mean_polarity,
        tier_counts,
    };
    (records, snapshot)
}
