use thiserror::Error;

/// Failure modes of the upstream comment/metadata API.
///
/// These are the only errors a [`crate::CommentSource`] may surface. The poll
/// scheduler translates them into backoff or degraded-status transitions; they
/// never reach the persistence or alerting layers mid-cycle.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Upstream signaled quota exhaustion (HTTP 429). Retry after the
    /// indicated delay.
    #[error("rate limited by upstream (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    /// Transient network, timeout, or server-side failure. Retryable.
    #[error("upstream unavailable: {reason}")]
    Unavailable { reason: String },

    /// The resource no longer exists upstream. Not retryable until the
    /// resource is manually re-added.
    #[error("resource {resource_id} not found upstream")]
    NotFound { resource_id: String },
}

/// Failure modes of the snapshot store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write or read against the store failed. The in-flight cycle is
    /// abandoned and re-attempted on the next scheduled tick.
    #[error("persistence failure: {reason}")]
    Persistence { reason: String },
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for environment variable {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
