//! Per-resource polling workers and the registry that owns them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use pulsewatch_core::{
    AlertThresholds, AppConfig, CommentSource, MetadataStore, MonitoredResource, SentimentScorer,
    SnapshotStore, SourceError, StoreError,
};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::cache::MetadataCache;
use crate::cycle::{run_cycle, CycleContext, CycleError};
use crate::status::{PollState, ResourceStatus, StatusBoard};

/// Scheduler knobs, extracted from [`AppConfig`] at startup.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Cadence for resources watched without an explicit interval.
    pub poll_interval: Duration,
    pub fetch_limit: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// `None` means one polling interval per resource.
    pub alert_cooldown: Option<Duration>,
    pub metadata_ttl: Option<Duration>,
    pub thresholds: AlertThresholds,
}

impl MonitorConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            fetch_limit: config.fetch_limit,
            backoff_base: Duration::from_secs(config.backoff_base_secs),
            backoff_cap: Duration::from_secs(config.backoff_cap_secs),
            alert_cooldown: config.alert_cooldown_secs.map(Duration::from_secs),
            metadata_ttl: config.metadata_ttl_secs.map(Duration::from_secs),
            thresholds: config.thresholds,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1800),
            fetch_limit: 100,
            backoff_base: Duration::from_secs(5),
            backoff_cap: Duration::from_secs(900),
            alert_cooldown: None,
            metadata_ttl: None,
            thresholds: AlertThresholds::default(),
        }
    }
}

struct WatchedResource {
    resource: MonitoredResource,
    stop: watch::Sender<bool>,
}

struct Inner<C, S> {
    source: Arc<C>,
    store: Arc<S>,
    scorer: Arc<dyn SentimentScorer>,
    cache: MetadataCache<C, S>,
    config: MonitorConfig,
    board: StatusBoard,
    registry: Mutex<HashMap<String, WatchedResource>>,
}

/// The monitoring engine: a registry of independently scheduled per-resource
/// workers over one shared source, store, and scorer. Cloning is cheap and
/// shares the registry.
pub struct Monitor<C, S> {
    inner: Arc<Inner<C, S>>,
}

impl<C, S> Clone for Monitor<C, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, S> Monitor<C, S>
where
    C: CommentSource + 'static,
    S: SnapshotStore + MetadataStore + 'static,
{
    #[must_use]
    pub fn new(
        source: Arc<C>,
        store: Arc<S>,
        scorer: Arc<dyn SentimentScorer>,
        config: MonitorConfig,
    ) -> Self {
        let cache = MetadataCache::new(Arc::clone(&source), Arc::clone(&store), config.metadata_ttl);
        Self {
            inner: Arc::new(Inner {
                source,
                store,
                scorer,
                cache,
                config,
                board: StatusBoard::default(),
                registry: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Start watching `resource_id`, spawning its worker. Returns `false` if
    /// it is already watched (the existing worker and its cadence stay put).
    pub fn watch(&self, resource_id: &str, poll_interval: Option<Duration>) -> bool {
        let interval = poll_interval.unwrap_or(self.inner.config.poll_interval);
        let resource = MonitoredResource {
            resource_id: resource_id.to_owned(),
            added_at: Utc::now(),
            poll_interval_secs: interval.as_secs(),
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        {
            let mut registry = lock(&self.inner.registry);
            if registry.contains_key(resource_id) {
                return false;
            }
            registry.insert(
                resource_id.to_owned(),
                WatchedResource {
                    resource: resource.clone(),
                    stop: stop_tx,
                },
            );
        }
        self.inner
            .board
            .insert(resource_id, resource.added_at, resource.poll_interval_secs);
        tracing::info!(
            resource_id,
            poll_interval_secs = resource.poll_interval_secs,
            "watching resource"
        );
        tokio::spawn(run_worker(
            Arc::clone(&self.inner),
            resource.resource_id,
            interval,
            stop_rx,
        ));
        true
    }

    /// Watch every id in `resource_ids` at the default cadence.
    pub fn watch_all<I>(&self, resource_ids: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        for id in resource_ids {
            self.watch(id.as_ref(), None);
        }
    }

    /// Reconfigure the polling cadence of an already-watched resource. The
    /// old worker stops (an in-flight cycle finishes and persists first) and
    /// a fresh one starts on the new interval; the resource's status history
    /// carries over. Returns `false` when the resource is not watched.
    pub fn set_interval(&self, resource_id: &str, poll_interval: Duration) -> bool {
        let stop_rx = {
            let mut registry = lock(&self.inner.registry);
            let Some(watched) = registry.get_mut(resource_id) else {
                return false;
            };
            let _ = watched.stop.send(true);
            let (stop_tx, stop_rx) = watch::channel(false);
            watched.stop = stop_tx;
            watched.resource.poll_interval_secs = poll_interval.as_secs();
            stop_rx
        };
        self.inner
            .board
            .set_interval(resource_id, poll_interval.as_secs());
        tracing::info!(
            resource_id,
            poll_interval_secs = poll_interval.as_secs(),
            "poll interval reconfigured"
        );
        tokio::spawn(run_worker(
            Arc::clone(&self.inner),
            resource_id.to_owned(),
            poll_interval,
            stop_rx,
        ));
        true
    }

    /// Stop watching `resource_id`. An in-flight cycle finishes (and
    /// persists) before its worker exits; no new cycle starts. Persisted
    /// history and alerts are untouched. Returns `false` when unknown.
    pub fn unwatch(&self, resource_id: &str) -> bool {
        let Some(watched) = lock(&self.inner.registry).remove(resource_id) else {
            return false;
        };
        let _ = watched.stop.send(true);
        self.inner.board.remove(resource_id);
        tracing::info!(resource_id, "unwatched resource");
        true
    }

    #[must_use]
    pub fn is_watched(&self, resource_id: &str) -> bool {
        lock(&self.inner.registry).contains_key(resource_id)
    }

    /// The watch list, sorted by resource id.
    #[must_use]
    pub fn resources(&self) -> Vec<MonitoredResource> {
        let mut resources: Vec<MonitoredResource> = lock(&self.inner.registry)
            .values()
            .map(|w| w.resource.clone())
            .collect();
        resources.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
        resources
    }

    /// Operational status of every watched resource, sorted by resource id.
    #[must_use]
    pub fn statuses(&self) -> Vec<ResourceStatus> {
        self.inner.board.snapshot()
    }

    #[must_use]
    pub fn status(&self, resource_id: &str) -> Option<ResourceStatus> {
        self.inner.board.get(resource_id)
    }

    /// Drop the cached metadata for `resource_id`; the next cycle refetches.
    pub async fn invalidate_metadata(&self, resource_id: &str) -> Result<(), StoreError> {
        self.inner.cache.invalidate(resource_id).await
    }

    /// Signal every worker to stop after its current cycle.
    pub fn shutdown(&self) {
        let mut registry = lock(&self.inner.registry);
        for watched in registry.values() {
            let _ = watched.stop.send(true);
        }
        registry.clear();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_worker<C, S>(
    inner: Arc<Inner<C, S>>,
    resource_id: String,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) where
    C: CommentSource + 'static,
    S: SnapshotStore + MetadataStore + 'static,
{
    let cooldown = inner.config.alert_cooldown.unwrap_or(interval);
    let ctx = CycleContext {
        source: &*inner.source,
        store: &*inner.store,
        scorer: &*inner.scorer,
        cache: &inner.cache,
        board: &inner.board,
        fetch_limit: inner.config.fetch_limit,
        thresholds: &inner.config.thresholds,
        cooldown,
    };
    let mut backoff = inner.config.backoff_base;

    loop {
        if *stop.borrow() {
            break;
        }
        let cycle_start = Instant::now();
        let result = run_cycle(&ctx, &resource_id).await;
        if *stop.borrow() {
            // Unwatched while the cycle was in flight; its writes stand.
            break;
        }

        let wait = match result {
            Ok(_) => {
                backoff = inner.config.backoff_base;
                inner.board.record_success(&resource_id, Utc::now());
                // Cadence is measured from cycle start, not completion.
                interval.saturating_sub(cycle_start.elapsed())
            }
            Err(CycleError::Fetch(SourceError::NotFound { .. })) => {
                inner
                    .board
                    .record_failure(&resource_id, "resource not found upstream", true);
                inner.board.set_state(&resource_id, PollState::Idle);
                tracing::warn!(resource_id, "resource gone upstream, polling parked");
                park_until_stopped(&mut stop).await;
                break;
            }
            Err(CycleError::Fetch(error)) => {
                // Rate limiting floors the wait at the upstream's ask.
                let floor = match &error {
                    SourceError::RateLimited { retry_after_secs } => {
                        Duration::from_secs(*retry_after_secs)
                    }
                    _ => Duration::ZERO,
                };
                let wait = backoff.max(floor);
                let exhausted = backoff >= inner.config.backoff_cap;
                inner
                    .board
                    .record_failure(&resource_id, &error.to_string(), exhausted);
                inner
                    .board
                    .set_state(&resource_id, PollState::Backoff { until: backoff_until(wait) });
                backoff = (backoff * 2).min(inner.config.backoff_cap);
                tracing::warn!(resource_id, %error, wait_secs = wait.as_secs(), "fetch failed, backing off");
                wait
            }
            Err(CycleError::Store(error)) => {
                inner
                    .board
                    .record_failure(&resource_id, &error.to_string(), false);
                inner.board.set_state(&resource_id, PollState::Idle);
                tracing::error!(resource_id, %error, "cycle abandoned, retrying next tick");
                interval.saturating_sub(cycle_start.elapsed())
            }
        };

        tokio::select! {
            () = tokio::time::sleep(wait) => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }
    tracing::debug!(resource_id, "worker stopped");
}

async fn park_until_stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        if stop.changed().await.is_err() || *stop.borrow() {
            break;
        }
    }
}

fn backoff_until(wait: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(wait)
        .ok()
        .and_then(|d| Utc::now().checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeSource, FakeStore};
    use chrono::TimeZone;
    use pulsewatch_core::{AlertKind, FetchedComment, ResourceMetadata};

    struct WordScorer;

    impl SentimentScorer for WordScorer {
        fn score(&self, text: &str) -> f64 {
            match text {
                "awful" => -0.8,
                "great" => 0.8,
                "fine" => 0.3,
                _ => 0.0,
            }
        }
    }

    fn comment(id: &str, text: &str, offset_secs: i64) -> FetchedComment {
        FetchedComment {
            comment_id: id.to_owned(),
            text: text.to_owned(),
            author: "viewer".to_owned(),
            like_count: 0,
            reply_count: 0,
            published_at: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
                + chrono::Duration::seconds(offset_secs),
        }
    }

    fn batch(prefix: &str, text: &str, offset_secs: i64) -> Result<Vec<FetchedComment>, SourceError> {
        Ok(vec![
            comment(&format!("{prefix}-a"), text, offset_secs),
            comment(&format!("{prefix}-b"), text, offset_secs + 1),
        ])
    }

    fn test_config() -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_secs(60),
            backoff_base: Duration::from_secs(5),
            backoff_cap: Duration::from_secs(40),
            ..MonitorConfig::default()
        }
    }

    fn setup() -> (Arc<FakeSource>, Arc<FakeStore>, Monitor<FakeSource, FakeStore>) {
        let source = Arc::new(FakeSource::default());
        let store = Arc::new(FakeStore::default());
        let monitor = Monitor::new(
            Arc::clone(&source),
            Arc::clone(&store),
            Arc::new(WordScorer),
            test_config(),
        );
        (source, store, monitor)
    }

    async fn sleep_secs(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_persists_snapshot_and_raises_alert() {
        let (source, store, monitor) = setup();
        source.script_comments("vid-1", vec![batch("c1", "awful", 0)]);

        assert!(monitor.watch("vid-1", None));
        sleep_secs(1).await;

        let snapshots = store.snapshots("vid-1");
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].snapshot.sample_size, 2);
        assert!((snapshots[0].snapshot.mean_polarity - -0.8).abs() < 1e-9);
        assert_eq!(
            snapshots[0].snapshot.sample_size,
            snapshots[0].snapshot.tier_counts.sum()
        );
        assert_eq!(store.comment_count("vid-1"), 2);

        let alerts = store.alerts("vid-1");
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::SustainedNegative);
        assert_eq!(alerts[0].triggering_snapshot_id, snapshots[0].id);

        let status = monitor.status("vid-1").unwrap();
        assert!(status.last_success_at.is_some());
        assert_eq!(status.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_cycle_writes_no_snapshot() {
        let (source, store, monitor) = setup();
        source.script_comments("vid-1", vec![Ok(Vec::new())]);

        monitor.watch("vid-1", None);
        sleep_secs(1).await;

        assert!(store.snapshots("vid-1").is_empty());
        // An empty cycle still counts as a success.
        assert!(monitor.status("vid-1").unwrap().last_success_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_suppresses_repeat_alert_kind() {
        let (source, store, monitor) = setup();
        source.script_comments(
            "vid-1",
            vec![batch("c1", "awful", 0), batch("c2", "awful", 100)],
        );

        monitor.watch("vid-1", None);
        sleep_secs(90).await;

        assert_eq!(store.snapshots("vid-1").len(), 2);
        // Both cycles breach the negative threshold; only the first raises.
        assert_eq!(store.alerts("vid-1").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_resource_does_not_stall_others() {
        let (source, store, monitor) = setup();
        source.script_comments(
            "vid-a",
            vec![Err(SourceError::RateLimited {
                retry_after_secs: 300,
            })],
        );
        source.script_comments(
            "vid-b",
            vec![
                batch("c1", "fine", 0),
                batch("c2", "fine", 100),
                batch("c3", "fine", 200),
                batch("c4", "fine", 300),
            ],
        );

        monitor.watch("vid-a", None);
        monitor.watch("vid-b", None);
        sleep_secs(200).await;

        // vid-b kept its 60s cadence: cycles at 0, 60, 120, 180.
        assert_eq!(store.snapshots("vid-b").len(), 4);
        // vid-a is waiting out the retry-after and has not retried yet.
        assert_eq!(source.comment_calls("vid-a"), 1);
        assert!(store.snapshots("vid-a").is_empty());
        assert!(matches!(
            monitor.status("vid-a").unwrap().state,
            PollState::Backoff { .. }
        ));

        // The retry lands once the upstream's ask has elapsed.
        sleep_secs(110).await;
        assert_eq!(source.comment_calls("vid-a"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_then_resets_on_success() {
        let (source, store, monitor) = setup();
        let unavailable = || {
            Err(SourceError::Unavailable {
                reason: "upstream 500".to_owned(),
            })
        };
        source.script_comments(
            "vid-1",
            vec![
                unavailable(),
                unavailable(),
                unavailable(),
                batch("c1", "fine", 0),
            ],
        );

        monitor.watch("vid-1", None);

        // Failures at t=0, 5, 15; waits of 5, 10, 20 seconds.
        sleep_secs(3).await;
        assert_eq!(source.comment_calls("vid-1"), 1);
        sleep_secs(5).await; // t=8
        assert_eq!(source.comment_calls("vid-1"), 2);
        sleep_secs(10).await; // t=18
        assert_eq!(source.comment_calls("vid-1"), 3);
        assert_eq!(monitor.status("vid-1").unwrap().consecutive_failures, 3);

        // Success at t=35 resets the failure streak and the cadence.
        sleep_secs(20).await; // t=38
        assert_eq!(source.comment_calls("vid-1"), 4);
        assert_eq!(store.snapshots("vid-1").len(), 1);
        let status = monitor.status("vid-1").unwrap();
        assert_eq!(status.consecutive_failures, 0);
        assert!(!status.degraded);

        // Next cycle comes one full interval after the successful one.
        sleep_secs(52).await; // t=90
        assert_eq!(source.comment_calls("vid-1"), 4);
        sleep_secs(10).await; // t=100, past t=95
        assert_eq!(source.comment_calls("vid-1"), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_is_capped_and_marks_degraded() {
        let (source, _store, monitor) = setup();
        // Nothing but failures; the cap in test_config is 40s.
        source.script_comments(
            "vid-1",
            (0..10)
                .map(|_| {
                    Err(SourceError::Unavailable {
                        reason: "upstream 500".to_owned(),
                    })
                })
                .collect(),
        );

        monitor.watch("vid-1", None);
        // Failures at t=0, 5, 15, 35, 75 (waits 5, 10, 20, 40, 40).
        sleep_secs(80).await;
        assert_eq!(source.comment_calls("vid-1"), 5);
        // The fifth failure found the backoff already at its cap.
        assert!(monitor.status("vid-1").unwrap().degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_parks_the_worker_degraded() {
        let (source, store, monitor) = setup();
        source.script_comments(
            "vid-1",
            vec![Err(SourceError::NotFound {
                resource_id: "vid-1".to_owned(),
            })],
        );

        monitor.watch("vid-1", None);
        sleep_secs(1).await;

        let status = monitor.status("vid-1").unwrap();
        assert!(status.degraded);
        assert_eq!(status.consecutive_failures, 1);

        // Parked: no retries no matter how long we wait, but still watched.
        sleep_secs(600).await;
        assert_eq!(source.comment_calls("vid-1"), 1);
        assert!(monitor.is_watched("vid-1"));
        assert!(store.snapshots("vid-1").is_empty());

        assert!(monitor.unwatch("vid-1"));
        sleep_secs(1).await;
        assert!(!monitor.is_watched("vid-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_failure_retries_on_next_tick_without_backoff() {
        let (source, store, monitor) = setup();
        store.fail_next_append();
        source.script_comments(
            "vid-1",
            vec![batch("c1", "fine", 0), batch("c2", "fine", 100)],
        );

        monitor.watch("vid-1", None);
        sleep_secs(30).await;

        // First cycle fetched but could not persist.
        assert_eq!(source.comment_calls("vid-1"), 1);
        assert!(store.snapshots("vid-1").is_empty());
        let status = monitor.status("vid-1").unwrap();
        assert_eq!(status.consecutive_failures, 1);
        assert!(!matches!(status.state, PollState::Backoff { .. }));

        // Second tick lands on the normal cadence, not a backoff schedule.
        sleep_secs(40).await; // t=70
        assert_eq!(source.comment_calls("vid-1"), 2);
        assert_eq!(store.snapshots("vid-1").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unwatch_lets_inflight_cycle_finish() {
        let (source, store, monitor) = setup();
        source.set_fetch_delay(Duration::from_secs(30));
        source.script_comments("vid-1", vec![batch("c1", "fine", 0)]);

        monitor.watch("vid-1", None);
        sleep_secs(1).await;
        assert!(monitor.unwatch("vid-1"));

        // The in-flight fetch completes at t=31 and its cycle persists.
        sleep_secs(40).await;
        assert_eq!(store.snapshots("vid-1").len(), 1);
        assert_eq!(store.comment_count("vid-1"), 2);

        // But the worker is gone: no further cycles.
        sleep_secs(600).await;
        assert_eq!(source.comment_calls("vid-1"), 1);
        assert!(monitor.statuses().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn watch_is_idempotent_per_resource() {
        let (_source, _store, monitor) = setup();
        assert!(monitor.watch("vid-1", None));
        assert!(!monitor.watch("vid-1", Some(Duration::from_secs(10))));
        assert_eq!(monitor.statuses().len(), 1);
        assert_eq!(monitor.statuses()[0].poll_interval_secs, 60);

        assert!(monitor.unwatch("vid-1"));
        assert!(!monitor.unwatch("vid-1"));
        assert!(monitor.statuses().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn set_interval_rearms_the_worker_and_keeps_status() {
        let (source, store, monitor) = setup();
        source.script_comments(
            "vid-1",
            vec![
                Err(SourceError::Unavailable {
                    reason: "upstream 500".to_owned(),
                }),
                batch("c1", "fine", 0),
                batch("c2", "fine", 100),
            ],
        );

        monitor.watch("vid-1", None);
        sleep_secs(1).await;
        let before = monitor.status("vid-1").unwrap();
        assert_eq!(before.consecutive_failures, 1);

        assert!(monitor.set_interval("vid-1", Duration::from_secs(10)));
        let after = monitor.status("vid-1").unwrap();
        assert_eq!(after.added_at, before.added_at);
        assert_eq!(after.consecutive_failures, 1);
        assert_eq!(after.poll_interval_secs, 10);
        assert_eq!(monitor.resources()[0].poll_interval_secs, 10);

        // The re-armed worker polls immediately, then on the new cadence.
        sleep_secs(1).await; // t=2
        assert_eq!(store.snapshots("vid-1").len(), 1);
        sleep_secs(10).await; // t=12, past the 10s tick
        assert_eq!(store.snapshots("vid-1").len(), 2);
        // The old worker is gone: one failed call plus two cycles.
        assert_eq!(source.comment_calls("vid-1"), 3);

        assert!(!monitor.set_interval("vid-unknown", Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn metadata_is_refreshed_alongside_the_cycle() {
        let (source, store, monitor) = setup();
        source.set_metadata(
            "vid-1",
            Ok(ResourceMetadata {
                title: "Launch video".to_owned(),
                owner_name: "creator".to_owned(),
            }),
        );
        source.script_comments("vid-1", vec![batch("c1", "fine", 0)]);

        monitor.watch("vid-1", None);
        sleep_secs(1).await;

        assert_eq!(store.metadata("vid-1").unwrap().title, "Launch video");
    }
}
