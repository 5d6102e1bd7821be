// Rust guideline compliant 2026-07-28

use dispatcher::{BatchKey, DispatchError};

/// Errors raised synchronously on the submitting task, before a batch
/// ever reaches the dispatcher's mailbox.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubmitError {
    #[error("batch must contain at least one item")]
    EmptyBatch,
    #[error("batch key {key} is not declared for this dispatcher")]
    UnknownKey { key: BatchKey },
    #[error("batch of {size} items exceeds the configured batch_size {limit} in hooks mode")]
    OversizeBatch { size: usize, limit: usize },
    #[error("streamed input is not accepted in hooks mode")]
    StreamNotAllowedInHooksMode,
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Errors from [`crate::inline::run_inline`].
#[derive(Debug, thiserror::Error)]
pub enum InlineError<E> {
    #[error("batch must contain at least one item")]
    EmptyBatch,
    #[error(transparent)]
    Handler(#[from] E),
}
