// Rust guideline compliant 2026-07-28

use crate::error::DispatchError;
use domain::{Batch, BatchKey, Handler};
use std::sync::Arc;
use tokio::sync::mpsc;

/// The two channels a single accumulator-entry push can carry: the
/// submitting call's own reply channel, and, only for the streamed-input
/// path, the helper task's acknowledgement channel (the spec's "extra
/// proxy pid... used by streaming-input producers to acknowledge
/// progress").
pub struct WaiterRefs<H: Handler> {
    pub primary: mpsc::Sender<WaiterEvent<H>>,
    pub producer_ack: Option<mpsc::Sender<usize>>,
}

impl<H: Handler> Clone for WaiterRefs<H> {
    fn clone(&self) -> Self {
        Self {
            primary: self.primary.clone(),
            producer_ack: self.producer_ack.clone(),
        }
    }
}

/// Events a waiting client receives over its reply channel.
pub enum WaiterEvent<H: Handler> {
    /// A slice of a partition's output belonging to this waiter.
    Batch {
        start: usize,
        size: usize,
        output: Arc<[H::Output]>,
        metadata: H::Metadata,
    },
    /// A named hook invocation's slice (`hooks` mode only).
    Hook {
        start: usize,
        size: usize,
        output: Arc<[H::Output]>,
        hook_name: Arc<str>,
    },
    /// Terminal failure or disconnection; never sent alongside a `Batch`
    /// for the same waiter's final slice.
    Down(DispatchError),
}

/// One unit of work handed to a partition: a sealed, merged batch plus
/// the slice coordinates of every waiter that contributed to it.
pub struct PartitionJob<H: Handler> {
    pub batch: Batch<H::Item>,
    pub ref_sizes: Vec<crate::accumulator::RefSizes<H>>,
}

/// Messages accepted by the dispatcher task's mailbox.
pub enum DispatcherMsg<H: Handler> {
    BatchedRun {
        key: BatchKey,
        batch: Batch<H::Item>,
        refs: WaiterRefs<H>,
    },
    Timeout {
        key: BatchKey,
        tag: u64,
    },
    Done {
        partition: usize,
    },
}
