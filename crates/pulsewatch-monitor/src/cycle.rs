//! One fetch → score → persist → evaluate pass for a single resource.

use std::time::Duration;

use chrono::Utc;
use pulsewatch_core::{
    AlertThresholds, CommentSource, MetadataStore, SentimentScorer, SnapshotStore, SourceError,
    StoreError,
};

use crate::aggregate::score_cycle;
use crate::cache::MetadataCache;
use crate::evaluator::evaluate;
use crate::status::{PollState, StatusBoard};

/// Why a cycle did not complete. Drives the scheduler's backoff decisions.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CycleError {
    #[error(transparent)]
    Fetch(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a completed cycle produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CycleOutcome {
    /// Comments were scored and persisted under the returned snapshot id.
    Completed { snapshot_id: i64, alerts_raised: usize },
    /// Nothing new upstream; no snapshot is written for an empty cycle so
    /// quiet periods do not dilute the history with empty samples.
    NoNewComments,
}

pub(crate) struct CycleContext<'a, C, S> {
    pub source: &'a C,
    pub store: &'a S,
    pub scorer: &'a dyn SentimentScorer,
    pub cache: &'a MetadataCache<C, S>,
    pub board: &'a StatusBoard,
    pub fetch_limit: u32,
    pub thresholds: &'a AlertThresholds,
    pub cooldown: Duration,
}

pub(crate) async fn run_cycle<C, S>(
    ctx: &CycleContext<'_, C, S>,
    resource_id: &str,
) -> Result<CycleOutcome, CycleError>
where
    C: CommentSource,
    S: SnapshotStore + MetadataStore,
{
    ctx.board.set_state(resource_id, PollState::Fetching);

    // Metadata refresh rides along with the cycle but never fails it.
    if let Err(error) = ctx.cache.get(resource_id).await {
        tracing::debug!(resource_id, %error, "metadata refresh skipped");
    }

    let since = ctx
        .store
        .latest_comment_id(resource_id)
        .await
        .map_err(CycleError::Store)?;
    let fetched = ctx
        .source
        .fetch_new_comments(resource_id, since.as_deref(), ctx.fetch_limit)
        .await
        .map_err(CycleError::Fetch)?;

    if fetched.is_empty() {
        ctx.board.set_state(resource_id, PollState::Idle);
        tracing::debug!(resource_id, "no new comments this cycle");
        return Ok(CycleOutcome::NoNewComments);
    }

    ctx.board.set_state(resource_id, PollState::Scoring);
    let observed_at = Utc::now();
    let fetched_count = fetched.len();
    let (records, snapshot) = score_cycle(ctx.scorer, resource_id, fetched, observed_at);

    // Read the evaluator's inputs before committing the new snapshot, so
    // "previous" really is the prior cycle.
    let previous = ctx
        .store
        .latest_snapshot(resource_id)
        .await
        .map_err(CycleError::Store)?;
    let recent = ctx
        .store
        .recent_alerts(resource_id, ctx.cooldown)
        .await
        .map_err(CycleError::Store)?;

    ctx.board.set_state(resource_id, PollState::Persisting);
    let snapshot_id = ctx
        .store
        .append_cycle(&records, &snapshot)
        .await
        .map_err(CycleError::Store)?;

    ctx.board.set_state(resource_id, PollState::Evaluating);
    let events = evaluate(
        &snapshot,
        snapshot_id,
        previous.as_ref().map(|p| &p.snapshot),
        ctx.thresholds,
        &recent,
        ctx.cooldown,
    );
    for event in &events {
        let alert_id = ctx
            .store
            .append_alert(event)
            .await
            .map_err(CycleError::Store)?;
        tracing::warn!(
            resource_id,
            alert_id,
            kind = event.kind.as_str(),
            severity = event.severity.as_str(),
            observed = event.observed,
            "alert raised: {}",
            event.message
        );
    }

    ctx.board.set_state(resource_id, PollState::Idle);
    tracing::info!(
        resource_id,
        snapshot_id,
        comments = fetched_count,
        mean_polarity = snapshot.mean_polarity,
        alerts = events.len(),
        "cycle completed"
    );
    Ok(CycleOutcome::Completed {
        snapshot_id,
        alerts_raised: events.len(),
    })
}
