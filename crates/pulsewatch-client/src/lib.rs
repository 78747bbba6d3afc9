//! HTTP client for the upstream comment/metadata API.
//!
//! Owns pagination, timeouts, and the mapping from HTTP failures to the
//! engine's [`pulsewatch_core::SourceError`] taxonomy. Deliberately does not
//! retry: the poll scheduler owns backoff, and retrying in both layers would
//! compound delays.

mod client;
mod types;

pub use client::CommentApiClient;
pub use types::{CommentPayload, CommentsPage, MetadataPayload};
