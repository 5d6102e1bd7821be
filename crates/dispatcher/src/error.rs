// Rust guideline compliant 2026-07-28

use domain::BatchKey;
use std::sync::Arc;

/// Errors raised while building a [`crate::config::ServingConfig`].
///
/// Surfaced synchronously at startup, matching the "Configuration" row of
/// the error-kind table: a misconfigured dispatcher never gets to run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("dispatcher name must not be empty")]
    MissingName,
    #[error("batch_size must be a positive integer")]
    InvalidBatchSize,
    #[error("partitions must be a positive integer")]
    InvalidPartitions,
    #[error("batch_keys must declare at least one key")]
    EmptyBatchKeys,
}

/// Errors raised while submitting to, or by, a running dispatcher.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    /// Submitted batch exceeds the configured `batch_size`.
    #[error("batch size exceeds the configured limit of {limit}")]
    OversizeBatch { limit: usize },
    /// Submitted batch carries an empty item list.
    #[error("batch must contain at least one item")]
    EmptyBatch,
    /// Submitted batch's key is not one of the dispatcher's declared keys.
    #[error("batch key {key} is not declared for this dispatcher")]
    UnknownKey { key: BatchKey },
    /// A stream of batches was submitted to a `hooks`-mode dispatcher.
    #[error("streamed input is not accepted in hooks mode")]
    StreamNotAllowedInHooksMode,
    /// The user handler (or the task running it) failed.
    #[error("worker failed: {reason}")]
    WorkerFailed { reason: Arc<str> },
    /// The dispatcher task exited while a caller was still waiting.
    #[error("dispatcher is no longer running")]
    DispatcherGone,
    /// No dispatcher process could be found, locally or in the cluster.
    #[error("no dispatcher process available")]
    NoProc,
}
