// Rust guideline compliant 2026-07-28

//! The dispatcher loop: a single task that owns every accumulator, both
//! FIFOs, the pending-batch queues, and the set of busy partitions. No
//! field here is ever touched by any task but the one running [`Engine::run`].

use crate::accumulator::{decide_arrival, Accumulator, ArrivalAction, RefSizes, SealedBatch, TimerState};
use crate::config::ServingConfig;
use crate::error::DispatchError;
use crate::message::{DispatcherMsg, PartitionJob, WaiterEvent, WaiterRefs};
use crate::partition;
use domain::{Batch, BatchKey, Handler, ServingMode};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::WeakSender;
use tokio::task::JoinError;

const MAILBOX_CAPACITY: usize = 1024;
const PARTITION_CAPACITY: usize = 1;

/// A cheaply cloneable front door to a running dispatcher. Every public
/// method is the Rust realization of a wire message from §6: submitting
/// a batch, or reading the metadata a client needs before it submits.
pub struct DispatcherHandle<H: Handler> {
    tx: mpsc::Sender<DispatcherMsg<H>>,
    limit: usize,
    mode: ServingMode,
    batch_keys: Arc<[BatchKey]>,
}

impl<H: Handler> Clone for DispatcherHandle<H> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            limit: self.limit,
            mode: self.mode,
            batch_keys: Arc::clone(&self.batch_keys),
        }
    }
}

impl<H: Handler> DispatcherHandle<H> {
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.limit
    }

    #[must_use]
    pub fn mode(&self) -> ServingMode {
        self.mode
    }

    #[must_use]
    pub fn allows_key(&self, key: &BatchKey) -> bool {
        self.batch_keys.iter().any(|k| k == key)
    }

    /// Submit one batch on behalf of `primary`, optionally acknowledging
    /// progress to `producer_ack` (streamed-input path only).
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::DispatcherGone`] if the dispatcher task
    /// has already shut down.
    pub async fn submit(
        &self,
        key: BatchKey,
        batch: Batch<H::Item>,
        primary: mpsc::Sender<WaiterEvent<H>>,
        producer_ack: Option<mpsc::Sender<usize>>,
    ) -> Result<(), DispatchError> {
        let refs = WaiterRefs { primary, producer_ack };
        self.tx
            .send(DispatcherMsg::BatchedRun { key, batch, refs })
            .await
            .map_err(|_| DispatchError::DispatcherGone)
    }
}

type PartitionFuture = Pin<Box<dyn Future<Output = (usize, Result<(), JoinError>)> + Send>>;

/// Owns all dispatcher state. Constructed and run by [`start`].
pub struct Engine<H: Handler> {
    name: Arc<str>,
    limit: usize,
    mode: ServingMode,
    batch_timeout: Duration,
    shutdown_grace: Duration,
    rx: mpsc::Receiver<DispatcherMsg<H>>,
    self_tx: WeakSender<DispatcherMsg<H>>,
    accumulators: HashMap<BatchKey, Accumulator<H>>,
    in_queue: VecDeque<BatchKey>,
    out_queue: VecDeque<usize>,
    pending: HashMap<BatchKey, VecDeque<SealedBatch<H>>>,
    busy: HashMap<usize, Vec<RefSizes<H>>>,
    partition_txs: Vec<mpsc::Sender<PartitionJob<H>>>,
    next_tag: u64,
}

/// Start a dispatcher: spawns one partition task per configured
/// partition, then spawns the dispatcher loop itself. Returns a handle
/// clients submit through and the loop's own join handle (mostly useful
/// for tests that want to await full shutdown).
pub fn start<H: Handler>(config: ServingConfig<H>) -> (DispatcherHandle<H>, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    let states = config.handler.init(config.partitions);

    let mut partition_txs = Vec::with_capacity(config.partitions);
    let mut partition_futures: Vec<PartitionFuture> = Vec::with_capacity(config.partitions);
    for (index, state) in states.into_iter().enumerate() {
        let (job_tx, job_rx) = mpsc::channel(PARTITION_CAPACITY);
        partition_txs.push(job_tx);
        let handler = Arc::clone(&config.handler);
        let engine_tx = tx.downgrade();
        let handle = tokio::spawn(partition::run_partition(index, handler, state, job_rx, engine_tx));
        partition_futures.push(Box::pin(async move { (index, handle.await) }));
    }

    let accumulators = config
        .batch_keys
        .iter()
        .cloned()
        .map(|key| (key, Accumulator::new()))
        .collect();

    let out_queue = (0..config.partitions).collect();

    let engine = Engine {
        name: Arc::clone(&config.name),
        limit: config.batch_size,
        mode: config.mode,
        batch_timeout: config.batch_timeout,
        shutdown_grace: config.shutdown_grace,
        rx,
        self_tx: tx.downgrade(),
        accumulators,
        in_queue: VecDeque::new(),
        out_queue,
        pending: HashMap::new(),
        busy: HashMap::new(),
        partition_txs,
        next_tag: 0,
    };

    let handle = DispatcherHandle {
        tx,
        limit: config.batch_size,
        mode: config.mode,
        batch_keys: Arc::from(config.batch_keys),
    };

    let partitions: FuturesUnordered<PartitionFuture> = partition_futures.into_iter().collect();
    let join = tokio::spawn(engine.run(partitions));
    (handle, join)
}

impl<H: Handler> Engine<H> {
    async fn run(mut self, mut partitions: FuturesUnordered<PartitionFuture>) {
        tracing::info!(name = %self.name, "dispatcher.started");
        loop {
            tokio::select! {
                msg = self.rx.recv() => {
                    match msg {
                        Some(DispatcherMsg::BatchedRun { key, batch, refs }) => {
                            self.arrive(key, refs, batch);
                        }
                        Some(DispatcherMsg::Timeout { key, tag }) => {
                            self.handle_timeout(key, tag);
                        }
                        Some(DispatcherMsg::Done { partition }) => {
                            self.handle_done(partition);
                        }
                        None => break,
                    }
                    self.maybe_dispatch();
                }
                Some((index, result)) = partitions.next(), if !partitions.is_empty() => {
                    if let Err(join_err) = result {
                        self.handle_partition_crash(index, join_err);
                    }
                }
            }
        }
        self.shutdown(partitions).await;
    }

    fn arrive(&mut self, key: BatchKey, refs: WaiterRefs<H>, batch: Batch<H::Item>) {
        let c = self.accumulators[&key].count();
        let s = batch.size();
        let hooks_mode = self.mode == ServingMode::Hooks;

        match decide_arrival(c, s, self.limit, hooks_mode) {
            ArrivalAction::Push => {
                self.push_and_maybe_arm(&key, refs, batch);
            }
            ArrivalAction::PushThenSeal => {
                self.accumulators.get_mut(&key).unwrap().push(refs, batch);
                self.seal_key(&key);
            }
            ArrivalAction::SealExistingThenPushThenSeal => {
                if !self.accumulators[&key].is_empty() {
                    self.seal_key(&key);
                }
                self.accumulators.get_mut(&key).unwrap().push(refs, batch);
                self.seal_key(&key);
            }
            ArrivalAction::SealExistingThenPushArmTimer => {
                if !self.accumulators[&key].is_empty() {
                    self.seal_key(&key);
                }
                self.push_and_maybe_arm(&key, refs, batch);
            }
            ArrivalAction::SplitThenSealPrefixRecurseSuffix { split_at } => {
                let (prefix, suffix) = batch.split(split_at);
                self.accumulators.get_mut(&key).unwrap().push(refs.clone(), prefix);
                self.seal_key(&key);
                if !suffix.is_empty() {
                    self.arrive(key, refs, suffix);
                }
            }
        }
    }

    fn push_and_maybe_arm(&mut self, key: &BatchKey, refs: WaiterRefs<H>, batch: Batch<H::Item>) {
        let acc = self.accumulators.get_mut(key).unwrap();
        acc.push(refs, batch);
        if matches!(acc.timer, TimerState::None) {
            let tag = self.next_tag;
            self.next_tag += 1;
            acc.timer = TimerState::Armed { tag };
            self.spawn_timer(key.clone(), tag);
        }
    }

    fn spawn_timer(&self, key: BatchKey, tag: u64) {
        let weak_tx = self.self_tx.clone();
        let delay = self.batch_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = weak_tx.upgrade() {
                let _ = tx.send(DispatcherMsg::Timeout { key, tag }).await;
            }
        });
    }

    fn seal_key(&mut self, key: &BatchKey) {
        let acc = self.accumulators.get_mut(key).unwrap();
        if acc.is_empty() {
            return;
        }
        tracing::debug!(key = %key, "dispatcher.batch.sealed");
        let sealed = acc.seal();
        self.pending.entry(key.clone()).or_default().push_back(sealed);
        self.in_queue.push_back(key.clone());
    }

    fn handle_timeout(&mut self, key: BatchKey, tag: u64) {
        let Some(acc) = self.accumulators.get_mut(&key) else {
            return;
        };
        match acc.timer {
            TimerState::Armed { tag: armed_tag } if armed_tag == tag => {
                if self.out_queue.is_empty() {
                    acc.timer = TimerState::Done;
                    self.in_queue.push_back(key);
                } else {
                    self.seal_key(&key);
                }
            }
            _ => {
                tracing::debug!(key = %key, tag, "dispatcher.timer.stale");
            }
        }
    }

    fn handle_done(&mut self, partition: usize) {
        self.busy.remove(&partition);
        self.out_queue.push_back(partition);
    }

    fn handle_partition_crash(&mut self, index: usize, join_err: JoinError) {
        tracing::warn!(index, error = %join_err, "dispatcher.partition.crashed");
        if let Some(ref_sizes) = self.busy.remove(&index) {
            let reason: Arc<str> = Arc::from(join_err.to_string());
            tokio::spawn(async move {
                for rs in ref_sizes {
                    let _ = rs
                        .refs
                        .primary
                        .send(WaiterEvent::Down(DispatchError::WorkerFailed {
                            reason: Arc::clone(&reason),
                        }))
                        .await;
                }
            });
        }
        // A crashed partition is not returned to `out_queue`: its job
        // channel is gone, so it can never be handed further work.
    }

    fn maybe_dispatch(&mut self) {
        loop {
            let Some(partition) = self.out_queue.pop_front() else {
                break;
            };
            let Some(key) = self.in_queue.pop_front() else {
                self.out_queue.push_front(partition);
                break;
            };
            let sealed = match self.pending.get_mut(&key).and_then(VecDeque::pop_front) {
                Some(sealed) => sealed,
                None => self.accumulators.get_mut(&key).unwrap().seal(),
            };
            self.dispatch_to_partition(partition, key, sealed);
        }
    }

    fn dispatch_to_partition(&mut self, partition: usize, key: BatchKey, sealed: SealedBatch<H>) {
        let SealedBatch { batch, ref_sizes } = sealed;
        let batch = batch.with_key(key.clone());
        self.busy.insert(partition, ref_sizes.clone());
        tracing::info!(partition, key = %key, batch_size = batch.size(), "dispatcher.partition.dispatched");
        let job = PartitionJob { batch, ref_sizes };
        if self.partition_txs[partition].try_send(job).is_err() {
            tracing::warn!(partition, "dispatcher.partition.send_failed");
        }
    }

    async fn shutdown(mut self, mut partitions: FuturesUnordered<PartitionFuture>) {
        tracing::info!(name = %self.name, "dispatcher.shutdown.begin");

        for (_, acc) in self.accumulators.drain() {
            for (refs, _batch) in acc.into_entries() {
                notify_down(refs, DispatchError::NoProc).await;
            }
        }
        for (_, queue) in self.pending.drain() {
            for sealed in queue {
                for rs in sealed.ref_sizes {
                    notify_down(rs.refs, DispatchError::NoProc).await;
                }
            }
        }

        // Idle partitions are blocked on `jobs.recv()`; drop their job
        // senders now so they return immediately instead of waiting out
        // the grace period below for no reason. A partition mid-job
        // finishes that job first regardless, unaffected by this drop.
        self.partition_txs.clear();

        let grace = self.shutdown_grace;
        let busy = &mut self.busy;
        let _ = tokio::time::timeout(grace, async {
            while let Some((index, result)) = partitions.next().await {
                if let Err(join_err) = result {
                    if let Some(ref_sizes) = busy.remove(&index) {
                        let reason: Arc<str> = Arc::from(join_err.to_string());
                        for rs in ref_sizes {
                            notify_down(rs.refs, DispatchError::WorkerFailed { reason: Arc::clone(&reason) }).await;
                        }
                    }
                }
            }
        })
        .await;

        tracing::info!(name = %self.name, "dispatcher.shutdown.complete");
    }
}

async fn notify_down<H: Handler>(refs: WaiterRefs<H>, reason: DispatchError) {
    let _ = refs.primary.send(WaiterEvent::Down(reason)).await;
}
