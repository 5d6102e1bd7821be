// Rust guideline compliant 2026-07-28

use crate::error::InlineError;
use domain::{Batch, Handler, HookSink};

/// Run a batch directly against `handler` on the calling task, with no
/// dispatcher involved.
///
/// If `batch_size` is set and the batch exceeds it, the batch is split
/// into successive chunks of at most `batch_size` and run one after
/// another against the same per-call state, in order; otherwise the
/// whole batch runs in a single call. Outputs are concatenated across
/// chunks and the last chunk's metadata is kept.
///
/// # Errors
///
/// Returns [`InlineError::EmptyBatch`] if `batch` is empty, or
/// [`InlineError::Handler`] if any chunk's call to `handler` fails.
pub async fn run_inline<H>(
    handler: &H,
    batch_size: Option<usize>,
    batch: Batch<H::Item>,
) -> Result<(Vec<H::Output>, H::Metadata), InlineError<H::Error>>
where
    H: Handler,
{
    if batch.is_empty() {
        return Err(InlineError::EmptyBatch);
    }

    let mut state = handler
        .init(1)
        .into_iter()
        .next()
        .expect("init(1) returns exactly one state");

    let key = batch.key().clone();
    let mut outputs = Vec::with_capacity(batch.size());
    let mut last_metadata = None;
    let mut remainder = batch;

    // No dispatcher or waiters exist inline, so there is nothing to
    // forward hook emissions to; drop the receiving end immediately so a
    // handler that emits hooks fails fast on `send` rather than blocking
    // on a full, unread channel.
    let (hook_tx, hook_rx) = tokio::sync::mpsc::channel(1);
    drop(hook_rx);
    let hooks = HookSink::new(hook_tx);

    loop {
        let (chunk, rest) = match batch_size {
            Some(limit) if remainder.size() > limit => remainder.split(limit),
            _ => (remainder, Batch::new(key.clone(), Vec::new())),
        };
        let (chunk_out, metadata) = handler.handle_batch(chunk, 0, &mut state, &hooks).await?;
        outputs.extend(chunk_out);
        last_metadata = Some(metadata);

        if rest.is_empty() {
            break;
        }
        remainder = rest;
    }

    let metadata = last_metadata.expect("at least one chunk always runs for a non-empty batch");
    Ok((outputs, metadata))
}
