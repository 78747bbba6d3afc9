//! Alert rules, applied to the snapshot a cycle just produced.
//!
//! Pure function of its inputs: the scheduler supplies the freshly committed
//! snapshot, the previous one, the configured thresholds, and the alerts
//! already raised inside the cooldown window. Nothing here touches a clock or
//! a store.

use std::time::Duration;

use chrono::DateTime;
use pulsewatch_core::{AlertEvent, AlertKind, AlertSeverity, AlertThresholds, SentimentSnapshot};

/// Evaluate all alert rules against `current` and return the events to raise.
///
/// Absolute rules (`sustained_negative`, `sustained_positive`) need only the
/// current snapshot; delta rules (`sentiment_drop`, `sentiment_rise`) are
/// skipped when `previous` is `None`. A kind is suppressed while an unresolved
/// alert of the same kind for this resource sits inside the trailing
/// `cooldown` window ending at `current.taken_at`. Distinct kinds never
/// suppress each other.
#[must_use]
pub(crate) fn evaluate(
    current: &SentimentSnapshot,
    current_snapshot_id: i64,
    previous: Option<&SentimentSnapshot>,
    thresholds: &AlertThresholds,
    recent_alerts: &[AlertEvent],
    cooldown: Duration,
) -> Vec<AlertEvent> {
    let window_start = chrono::Duration::from_std(cooldown)
        .ok()
        .and_then(|d| current.taken_at.checked_sub_signed(d))
        .unwrap_or(DateTime::UNIX_EPOCH);
    let suppressed = |kind: AlertKind| {
        recent_alerts
            .iter()
            .any(|a| a.kind == kind && !a.resolved && a.raised_at >= window_start)
    };

    let mean = current.mean_polarity;
    let mut events = Vec::new();
    let mut raise = |kind: AlertKind, threshold: f64, observed: f64, message: String| {
        if suppressed(kind) {
            return;
        }
        events.push(AlertEvent {
            resource_id: current.resource_id.clone(),
            raised_at: current.taken_at,
            kind,
            severity: severity_for(threshold, observed),
            message,
            threshold,
            observed,
            triggering_snapshot_id: current_snapshot_id,
            resolved: false,
        });
    };

    if mean < thresholds.negative_threshold {
        raise(
            AlertKind::SustainedNegative,
            thresholds.negative_threshold,
            mean,
            format!(
                "mean polarity {mean:.3} fell below {:.3}",
                thresholds.negative_threshold
            ),
        );
    }
    if mean > thresholds.positive_threshold {
        raise(
            AlertKind::SustainedPositive,
            thresholds.positive_threshold,
            mean,
            format!(
                "mean polarity {mean:.3} rose above {:.3}",
                thresholds.positive_threshold
            ),
        );
    }

    if let Some(previous) = previous {
        let delta = mean - previous.mean_polarity;
        if -delta >= thresholds.drop_threshold {
            raise(
                AlertKind::SentimentDrop,
                thresholds.drop_threshold,
                -delta,
                format!(
                    "mean polarity dropped by {:.3} ({:.3} to {mean:.3})",
                    -delta,
                    previous.mean_polarity
                ),
            );
        }
        if delta >= thresholds.rise_threshold {
            raise(
                AlertKind::SentimentRise,
                thresholds.rise_threshold,
                delta,
                format!(
                    "mean polarity rose by {delta:.3} ({:.3} to {mean:.3})",
                    previous.mean_polarity
                ),
            );
        }
    }

    events
}

/// Critical when the observed value breached twice the configured threshold
/// magnitude, warning otherwise.
fn severity_for(threshold: f64, observed: f64) -> AlertSeverity {
    if observed.abs() >= threshold.abs() * 2.0 {
        AlertSeverity::Critical
    } else {
        AlertSeverity::Warning
    }
}
