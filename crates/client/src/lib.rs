// Rust guideline compliant 2026-07-28

//! Client-side submission protocol: validates a caller's batch against a
//! running dispatcher, submits it (as one batch or as a lazily-produced
//! stream of batches), and reassembles the dispatcher's replies into
//! whatever shape the caller's postprocessing step wants.
//!
//! Three entry points, one per serving mode: [`execute`] (single
//! reassembled reply), [`stream`] (lazy sequence of replies, `batches`
//! and `hooks` modes), and [`inline::run_inline`] (no dispatcher at
//! all). Preprocessing and postprocessing are plain closures supplied
//! by the caller, matching the hook contract in the serving config.

mod error;
mod input;
mod stream;

pub mod inline;

pub use error::{InlineError, SubmitError};
pub use input::ClientInput;
pub use stream::{BatchStream, StreamItem};

pub use dispatcher::{Batch, BatchKey, DispatchError, DispatcherHandle, Handler, ServingMode};

use futures::StreamExt;
use tokio::sync::mpsc;

const REPLY_CHANNEL_CAPACITY: usize = 64;

/// Submit `input` to `dispatcher` and return one reassembled
/// `(items, metadata)` pair, built by concatenating every reply slice
/// in the order it is received and keeping the last metadata seen.
///
/// # Errors
///
/// Returns [`SubmitError`] if the batch is empty, the batch's key is
/// not declared for this dispatcher, or the dispatcher has shut down.
pub async fn execute<H, Pre, Post, Input, Info, R>(
    dispatcher: &DispatcherHandle<H>,
    input: Input,
    preprocessing: Pre,
    postprocessing: Post,
) -> Result<R, SubmitError>
where
    H: Handler,
    H::Output: Clone,
    Pre: FnOnce(Input) -> (ClientInput<H::Item>, Info),
    Post: FnOnce((Vec<H::Output>, H::Metadata), Info) -> R,
{
    let (client_input, info) = preprocessing(input);
    let collected = run_and_collect(dispatcher, client_input).await?;
    Ok(postprocessing(collected, info))
}

/// Submit `input` to `dispatcher` and hand postprocessing a lazy
/// [`BatchStream`] of replies instead of a reassembled result. Used for
/// `batches` and `hooks` serving modes when the caller wants to react
/// to each slice as it arrives rather than waiting for the whole run.
///
/// # Errors
///
/// Same as [`execute`], plus [`SubmitError::StreamNotAllowedInHooksMode`]
/// if `input` is a stream and the dispatcher runs in `hooks` mode.
pub async fn stream<H, Pre, Post, Input, Info, R>(
    dispatcher: &DispatcherHandle<H>,
    input: Input,
    preprocessing: Pre,
    postprocessing: Post,
) -> Result<R, SubmitError>
where
    H: Handler,
    Pre: FnOnce(Input) -> (ClientInput<H::Item>, Info),
    Post: FnOnce(BatchStream<H>, Info) -> R,
{
    let (client_input, info) = preprocessing(input);
    let batch_stream = submit(dispatcher, client_input).await?;
    Ok(postprocessing(batch_stream, info))
}

fn validate<H: Handler>(
    dispatcher: &DispatcherHandle<H>,
    batch: &Batch<H::Item>,
) -> Result<(), SubmitError> {
    if batch.is_empty() {
        return Err(SubmitError::EmptyBatch);
    }
    if !dispatcher.allows_key(batch.key()) {
        return Err(SubmitError::UnknownKey {
            key: batch.key().clone(),
        });
    }
    if dispatcher.mode() == ServingMode::Hooks && batch.size() > dispatcher.batch_size() {
        return Err(SubmitError::OversizeBatch {
            size: batch.size(),
            limit: dispatcher.batch_size(),
        });
    }
    Ok(())
}

/// Submit `input` and return the raw reply channel wrapped as a
/// [`BatchStream`], without reassembling. The streamed-input path
/// spawns a helper task that waits for each submission's items to be
/// fully acknowledged before handing the dispatcher the next one.
async fn submit<H: Handler>(
    dispatcher: &DispatcherHandle<H>,
    input: ClientInput<H::Item>,
) -> Result<BatchStream<H>, SubmitError> {
    match input {
        ClientInput::Single(batch) => {
            validate(dispatcher, &batch)?;
            let (tx, rx) = mpsc::channel(REPLY_CHANNEL_CAPACITY);
            dispatcher
                .submit(batch.key().clone(), batch, tx, None)
                .await?;
            Ok(BatchStream::new(rx))
        }
        ClientInput::Stream(mut items) => {
            if !dispatcher.mode().allows_stream_input() {
                return Err(SubmitError::StreamNotAllowedInHooksMode);
            }
            let (tx, rx) = mpsc::channel(REPLY_CHANNEL_CAPACITY);
            let (ack_tx, mut ack_rx) = mpsc::channel::<usize>(1);
            let dispatcher = dispatcher.clone();

            tokio::spawn(async move {
                let mut outstanding = 0usize;
                while let Some(batch) = items.next().await {
                    if let Err(err) = validate(&dispatcher, &batch) {
                        if let SubmitError::UnknownKey { key } = err {
                            let _ = tx
                                .send(dispatcher::WaiterEvent::Down(DispatchError::UnknownKey {
                                    key,
                                }))
                                .await;
                        }
                        return;
                    }
                    while outstanding > 0 {
                        match ack_rx.recv().await {
                            Some(acked) => outstanding = outstanding.saturating_sub(acked),
                            None => return,
                        }
                    }
                    outstanding = batch.size();
                    let key = batch.key().clone();
                    if dispatcher
                        .submit(key, batch, tx.clone(), Some(ack_tx.clone()))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            });

            Ok(BatchStream::new(rx))
        }
    }
}

async fn run_and_collect<H: Handler>(
    dispatcher: &DispatcherHandle<H>,
    input: ClientInput<H::Item>,
) -> Result<(Vec<H::Output>, H::Metadata), SubmitError>
where
    H::Output: Clone,
{
    let expected = match &input {
        ClientInput::Single(batch) => Some(batch.size()),
        ClientInput::Stream(_) => None,
    };
    let mut batch_stream = submit(dispatcher, input).await?;

    let mut items = Vec::with_capacity(expected.unwrap_or(0));
    let mut metadata = None;
    let mut received = 0usize;

    loop {
        if let Some(expected) = expected {
            if received >= expected {
                break;
            }
        }
        match batch_stream.next().await {
            Some(Ok(StreamItem::Batch { start, size, output, metadata: m })) => {
                items.extend_from_slice(&output[start..start + size]);
                metadata = Some(m);
                received += size;
            }
            // Hooks are side notifications, not part of the final reply;
            // a caller wanting them reads the stream directly instead of
            // going through `execute`'s running-total collection.
            Some(Ok(StreamItem::Hook { .. })) => {}
            Some(Err(reason)) => return Err(SubmitError::Dispatch(reason)),
            None => break,
        }
    }

    let metadata = metadata.ok_or(SubmitError::EmptyBatch)?;
    Ok((items, metadata))
}
