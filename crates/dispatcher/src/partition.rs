// Rust guideline compliant 2026-07-28

//! Worker pool: one long-lived task per partition, running the user
//! compute function and replying directly to waiters.

use crate::error::DispatchError;
use crate::message::{DispatcherMsg, PartitionJob, WaiterEvent};
use domain::{Handler, HookSink};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::WeakSender;

/// Hook-channel capacity: small and bounded, since a hook emission's only
/// job is to notify waiters before the partition moves on -- a slow
/// waiter should apply backpressure to the compute function, not let
/// emissions pile up unboundedly.
const HOOK_CHANNEL_CAPACITY: usize = 8;

/// Forwards every [`domain::HookEmission`] received on `hook_rx` to all of
/// `ref_sizes`'s waiters as a [`WaiterEvent::Hook`], slicing each
/// emission's outputs the same way a final batch reply is sliced. Runs
/// until `hook_rx` closes, i.e. until the [`HookSink`] side is dropped.
async fn forward_hooks<H: Handler>(
    mut hook_rx: mpsc::Receiver<domain::HookEmission<H::Output>>,
    ref_sizes: Vec<crate::accumulator::RefSizes<H>>,
) {
    while let Some(emission) = hook_rx.recv().await {
        let outputs: Arc<[H::Output]> = Arc::from(emission.outputs);
        for rs in &ref_sizes {
            let event = WaiterEvent::Hook {
                start: rs.start,
                size: rs.size,
                output: Arc::clone(&outputs),
                hook_name: Arc::clone(&emission.hook_name),
            };
            let _ = rs.refs.primary.send(event).await;
        }
    }
}

/// Runs partition `index` until its job channel closes (dispatcher
/// shutdown). Each job is processed to completion before the next is
/// received -- a partition runs exactly one compute at a time.
///
/// `engine_tx` is a [`WeakSender`], not a [`mpsc::Sender`]: a strong
/// clone held for this task's whole lifetime would itself keep the
/// dispatcher's mailbox open forever, so the only external
/// [`crate::engine::DispatcherHandle`] clones may ever close it.
pub(crate) async fn run_partition<H: Handler>(
    index: usize,
    handler: Arc<H>,
    mut state: H::State,
    mut jobs: mpsc::Receiver<PartitionJob<H>>,
    engine_tx: WeakSender<DispatcherMsg<H>>,
) {
    while let Some(job) = jobs.recv().await {
        let span = tracing::info_span!("partition", index);
        let _entered = span.enter();
        let batch_size = job.batch.size();

        let (hook_tx, hook_rx) = mpsc::channel(HOOK_CHANNEL_CAPACITY);
        let hook_sink = HookSink::new(hook_tx);
        let forward_task = tokio::spawn(forward_hooks(hook_rx, job.ref_sizes.clone()));

        let outcome = AssertUnwindSafe(handler.handle_batch(job.batch, index, &mut state, &hook_sink))
            .catch_unwind()
            .await;

        // Drop the only sender clone before awaiting the forwarder, or its
        // `recv().await` loop would never see the channel close.
        drop(hook_sink);
        let _ = forward_task.await;

        match outcome {
            Ok(Ok((outputs, metadata))) => {
                let outputs: Arc<[H::Output]> = Arc::from(outputs);
                tracing::info!(index, batch_size, "dispatcher.partition.completed");
                for rs in &job.ref_sizes {
                    let event = WaiterEvent::Batch {
                        start: rs.start,
                        size: rs.size,
                        output: Arc::clone(&outputs),
                        metadata: metadata.clone(),
                    };
                    let _ = rs.refs.primary.send(event).await;
                    if let Some(ack) = &rs.refs.producer_ack {
                        let _ = ack.send(rs.size).await;
                    }
                }
            }
            Ok(Err(handler_err)) => {
                let reason: Arc<str> = Arc::from(handler_err.to_string());
                tracing::warn!(index, reason = %reason, "dispatcher.worker.failed");
                notify_failure(&job.ref_sizes, reason).await;
            }
            Err(panic_payload) => {
                let reason: Arc<str> = Arc::from(panic_message(&panic_payload));
                tracing::warn!(index, reason = %reason, "dispatcher.worker.panicked");
                notify_failure(&job.ref_sizes, reason).await;
            }
        }

        drop(_entered);
        let Some(tx) = engine_tx.upgrade() else {
            break;
        };
        if tx.send(DispatcherMsg::Done { partition: index }).await.is_err() {
            break;
        }
    }
}

async fn notify_failure<H: Handler>(ref_sizes: &[crate::accumulator::RefSizes<H>], reason: Arc<str>) {
    for rs in ref_sizes {
        let _ = rs
            .refs
            .primary
            .send(WaiterEvent::Down(DispatchError::WorkerFailed {
                reason: Arc::clone(&reason),
            }))
            .await;
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked with a non-string payload".to_owned()
    }
}
