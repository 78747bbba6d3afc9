//! Polling, scoring, and alerting engine.
//!
//! A [`Monitor`] owns one background worker per watched resource. Each
//! worker runs fetch/score/persist/evaluate cycles on a fixed cadence,
//! backing off when the upstream misbehaves. Everything here is generic
//! over the [`pulsewatch_core::CommentSource`] and store traits so the
//! scheduling logic can be exercised without a network or a database.

mod aggregate;
mod cache;
mod cycle;
mod evaluator;
mod scheduler;
mod status;

#[cfg(test)]
pub(crate) mod fakes;

pub use scheduler::{Monitor, MonitorConfig};
pub use status::{PollState, ResourceStatus};
