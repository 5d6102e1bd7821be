// Rust guideline compliant 2026-07-28

//! Shared domain types for the batching request dispatcher.
//!
//! Defines [`Batch`], [`BatchKey`], and the [`Handler`] hexagonal port that
//! every dispatcher, client, and cluster crate in this workspace depends on.
//! No other crate in the workspace is imported here.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// BatchKey
// ---------------------------------------------------------------------------

/// Opaque tag selecting which per-key accumulator a [`Batch`] joins.
///
/// Cheap to clone (backed by `Arc<str>`) so it can be copied into every
/// waiter record and queue entry without an allocation per clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey(Arc<str>);

impl BatchKey {
    /// The sentinel key used when a batch carries no explicit key.
    #[must_use]
    pub fn default_key() -> Self {
        Self(Arc::from("default"))
    }

    /// Create a key from any string-like value.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BatchKey {
    fn default() -> Self {
        Self::default_key()
    }
}

impl std::fmt::Display for BatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BatchKey {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

// ---------------------------------------------------------------------------
// BatchError
// ---------------------------------------------------------------------------

/// Errors that [`Batch`] operations can return.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BatchError {
    /// `merge` was attempted across batches tagged with different keys.
    #[error("cannot merge batches with different keys: {left} != {right}")]
    KeyMismatch { left: BatchKey, right: BatchKey },
    /// The dispatcher boundary rejects empty batches.
    #[error("batch must contain at least one item")]
    Empty,
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// An ordered, keyed sequence of opaque items with an explicit size.
///
/// `size` is always kept equal to `items.len()`; this is an invariant
/// enforced by every constructor and mutator below rather than recomputed
/// on every read.
#[derive(Debug, Clone)]
pub struct Batch<T> {
    key: BatchKey,
    items: Vec<T>,
}

impl<T> Batch<T> {
    /// Build a batch from an explicit key and items.
    #[must_use]
    pub fn new(key: BatchKey, items: Vec<T>) -> Self {
        Self { key, items }
    }

    /// Build a batch tagged with [`BatchKey::default_key`].
    ///
    /// `stack` and `concat` are kept as two named constructors for source
    /// compatibility with callers that distinguish "stacking" from
    /// "concatenation"; both behave identically here -- each input item
    /// contributes exactly one entry to `size`.
    #[must_use]
    pub fn stack(items: Vec<T>) -> Self {
        Self::new(BatchKey::default_key(), items)
    }

    /// See [`Batch::stack`]. Identical semantics, kept as a distinct name.
    #[must_use]
    pub fn concat(items: Vec<T>) -> Self {
        Self::stack(items)
    }

    /// Attach `key` to a batch built via [`Batch::stack`]/[`Batch::concat`].
    #[must_use]
    pub fn with_key(mut self, key: BatchKey) -> Self {
        self.key = key;
        self
    }

    #[must_use]
    pub fn key(&self) -> &BatchKey {
        &self.key
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    #[must_use]
    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// Concatenate `other`'s items after `self`'s, left to right.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::KeyMismatch`] if the two batches carry
    /// different keys.
    pub fn merge(mut self, other: Batch<T>) -> Result<Self, BatchError> {
        if self.key != other.key {
            return Err(BatchError::KeyMismatch {
                left: self.key,
                right: other.key,
            });
        }
        self.items.extend(other.items);
        Ok(self)
    }

    /// Split at item index `n`, preserving order and key in both halves.
    ///
    /// With `0 < n < size`, returns `(prefix of n, suffix of size - n)`.
    /// With `n >= size`, returns `(self, empty-with-same-key)` -- the whole
    /// batch is the prefix and the suffix is empty, matching the "split
    /// past the end" rule.
    #[must_use]
    pub fn split(mut self, n: usize) -> (Self, Self) {
        if n >= self.items.len() {
            let empty = Batch::new(self.key.clone(), Vec::new());
            return (self, empty);
        }
        let suffix_items = self.items.split_off(n);
        let suffix = Batch::new(self.key.clone(), suffix_items);
        (self, suffix)
    }
}

// ---------------------------------------------------------------------------
// ServingMode
// ---------------------------------------------------------------------------

/// The three mutually exclusive output modes a dispatcher operates in,
/// fixed at startup from serving configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServingMode {
    /// Waiters receive a single reassembled reply per call.
    Execute,
    /// Identical wire protocol to `Execute`, but the client exposes a
    /// sequence of per-batch replies to postprocessing.
    Batches,
    /// The compute function invokes named hooks mid-execution; input must
    /// be a single batch no larger than `batch_size`.
    Hooks,
}

impl ServingMode {
    #[must_use]
    pub fn allows_stream_input(self) -> bool {
        !matches!(self, ServingMode::Hooks)
    }
}

impl Default for ServingMode {
    fn default() -> Self {
        ServingMode::Execute
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// One named, mid-execution emission from a `hooks`-mode compute function:
/// a hook name plus one output value per item of the batch currently
/// executing, in the same order as that batch.
pub struct HookEmission<O> {
    pub hook_name: Arc<str>,
    pub outputs: Vec<O>,
}

/// Handed to [`Handler::handle_batch`] so a `hooks`-mode compute function
/// can emit zero or more named, mid-execution values before it returns its
/// final output.
///
/// Realizes the source's "dispatcher-wide table keyed by partition index
/// maps to the in-flight ref-sizes so hook callbacks can find their
/// waiters": here, the table collapses to this single channel, privately
/// owned by the one partition task running this batch, because Rust's
/// ownership model already guarantees "each partition writes and reads
/// only its own slot" -- there is no table to index into because each
/// partition never sees another partition's sink.
pub struct HookSink<O> {
    tx: mpsc::Sender<HookEmission<O>>,
}

impl<O> HookSink<O> {
    #[must_use]
    pub fn new(tx: mpsc::Sender<HookEmission<O>>) -> Self {
        Self { tx }
    }

    /// Emit one named hook value, covering every item of the batch
    /// currently executing, in order. Best-effort: dropped silently if the
    /// receiving side has already gone away (e.g. the partition is
    /// shutting down), matching this workspace's other waiter sends.
    pub async fn emit(&self, hook_name: impl Into<Arc<str>>, outputs: Vec<O>) {
        let _ = self
            .tx
            .send(HookEmission {
                hook_name: hook_name.into(),
                outputs,
            })
            .await;
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// User compute contract: one [`Handler`] is shared by every partition in a
/// dispatcher, and owns one `State` value per partition.
///
/// Modeled as a capability trait rather than a bare function so that
/// stateful handlers (e.g. one model handle per partition) and
/// key-dispatching handlers (see [`KeyedFnHandler`]) share one call
/// surface. `init` creates per-partition state up front; partitions run on
/// a multi-thread runtime, so `handle_batch` returns an explicit
/// `impl Future<..> + Send` rather than using `async fn` in trait --
/// unlike this workspace's other hexagonal ports, the returned future must
/// cross a `tokio::spawn` boundary.
pub trait Handler: Send + Sync + 'static {
    /// Opaque item type flowing through batches.
    type Item: Send + 'static;
    /// One output item per input item, in order.
    type Output: Send + 'static;
    /// Side value returned alongside the outputs (e.g. model version).
    type Metadata: Send + Sync + Clone + 'static;
    /// Per-partition state created by `init`.
    type State: Send + 'static;
    /// Error type surfaced to every waiter of a failed batch.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Create one state value per partition, in partition order.
    fn init(&self, partitions: usize) -> Vec<Self::State>;

    /// Run the compute function over `batch`, returning one output per
    /// input item (in the same order) plus shared metadata.
    ///
    /// `hooks` is only meaningful for a dispatcher configured in
    /// `hooks` mode; a handler that never runs under that mode is free to
    /// ignore it.
    fn handle_batch(
        &self,
        batch: Batch<Self::Item>,
        partition: usize,
        state: &mut Self::State,
        hooks: &HookSink<Self::Output>,
    ) -> impl Future<Output = Result<(Vec<Self::Output>, Self::Metadata), Self::Error>> + Send;
}

/// Error type used by the [`FnHandler`]/[`KeyedFnHandler`] default wrappers.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("handler closure returned a mismatched output length")]
pub struct FnHandlerError;

/// Wraps a plain `Fn(Vec<T>) -> Fut` closure as a [`Handler`] with no
/// metadata and no per-partition state -- the default used when a caller
/// supplies only a compute closure and no stateful adapter.
pub struct FnHandler<F, Fut, T, O> {
    f: F,
    _marker: std::marker::PhantomData<fn(T) -> (Fut, O)>,
}

impl<F, Fut, T, O> FnHandler<F, Fut, T, O>
where
    F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Vec<O>> + Send,
    T: Send + 'static,
    O: Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<F, Fut, T, O> Handler for FnHandler<F, Fut, T, O>
where
    F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Vec<O>> + Send,
    T: Send + 'static,
    O: Send + 'static,
{
    type Item = T;
    type Output = O;
    type Metadata = ();
    type State = ();
    type Error = FnHandlerError;

    fn init(&self, partitions: usize) -> Vec<Self::State> {
        vec![(); partitions]
    }

    async fn handle_batch(
        &self,
        batch: Batch<Self::Item>,
        _partition: usize,
        _state: &mut Self::State,
        _hooks: &HookSink<Self::Output>,
    ) -> Result<(Vec<Self::Output>, Self::Metadata), Self::Error> {
        let out = (self.f)(batch.into_items()).await;
        Ok((out, ()))
    }
}

/// Key-dispatching default handler: maintains a `key -> compute-function`
/// map, cloned once per partition during `init` so no partition contends
/// with another for a lock.
pub struct KeyedFnHandler<F, Fut, T, O> {
    by_key: HashMap<BatchKey, Arc<F>>,
    _marker: std::marker::PhantomData<fn(T) -> (Fut, O)>,
}

impl<F, Fut, T, O> KeyedFnHandler<F, Fut, T, O>
where
    F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Vec<O>> + Send,
    T: Send + 'static,
    O: Send + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_key: HashMap::new(),
            _marker: std::marker::PhantomData,
        }
    }

    #[must_use]
    pub fn with(mut self, key: BatchKey, f: F) -> Self {
        self.by_key.insert(key, Arc::from(f));
        self
    }
}

impl<F, Fut, T, O> Default for KeyedFnHandler<F, Fut, T, O>
where
    F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Vec<O>> + Send,
    T: Send + 'static,
    O: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Errors a [`KeyedFnHandler`] can return.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KeyedFnHandlerError {
    /// No compute function was registered for the batch's key.
    #[error("no handler registered for key {0}")]
    UnknownKey(BatchKey),
}

impl<F, Fut, T, O> Handler for KeyedFnHandler<F, Fut, T, O>
where
    F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Vec<O>> + Send,
    T: Send + 'static,
    O: Send + 'static,
{
    type Item = T;
    type Output = O;
    type Metadata = ();
    type State = HashMap<BatchKey, Arc<F>>;
    type Error = KeyedFnHandlerError;

    fn init(&self, partitions: usize) -> Vec<Self::State> {
        (0..partitions).map(|_| self.by_key.clone()).collect()
    }

    async fn handle_batch(
        &self,
        batch: Batch<Self::Item>,
        _partition: usize,
        state: &mut Self::State,
        _hooks: &HookSink<Self::Output>,
    ) -> Result<(Vec<Self::Output>, Self::Metadata), Self::Error> {
        let key = batch.key().clone();
        let f = state
            .get(&key)
            .cloned()
            .ok_or(KeyedFnHandlerError::UnknownKey(key))?;
        let out = f(batch.into_items()).await;
        Ok((out, ()))
    }
}

#[cfg(test)]
mod tests {
    use super::{Batch, BatchError, BatchKey};

    #[test]
    fn stack_and_concat_are_equivalent() {
        let a = Batch::stack(vec![1, 2, 3]);
        let b = Batch::concat(vec![1, 2, 3]);
        assert_eq!(a.size(), b.size());
        assert_eq!(a.items(), b.items());
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn merge_concatenates_in_order() {
        let a = Batch::stack(vec![1, 2]);
        let b = Batch::stack(vec![3, 4]);
        let merged = a.merge(b).unwrap();
        assert_eq!(merged.items(), &[1, 2, 3, 4]);
    }

    #[test]
    fn merge_rejects_key_mismatch() {
        let a = Batch::stack(vec![1]).with_key(BatchKey::new("double"));
        let b = Batch::stack(vec![2]).with_key(BatchKey::new("half"));
        let err = a.merge(b).unwrap_err();
        assert!(matches!(err, BatchError::KeyMismatch { .. }));
    }

    #[test]
    fn split_within_bounds_preserves_order_and_key() {
        let key = BatchKey::new("k");
        let batch = Batch::new(key.clone(), vec![1, 2, 3, 4]);
        let (prefix, suffix) = batch.split(1);
        assert_eq!(prefix.items(), &[1]);
        assert_eq!(suffix.items(), &[2, 3, 4]);
        assert_eq!(prefix.key(), &key);
        assert_eq!(suffix.key(), &key);
    }

    #[test]
    fn split_past_end_returns_whole_batch_and_empty_suffix() {
        let batch = Batch::stack(vec![1, 2, 3]);
        let (prefix, suffix) = batch.split(10);
        assert_eq!(prefix.items(), &[1, 2, 3]);
        assert!(suffix.is_empty());
        assert_eq!(suffix.key(), prefix.key());
    }

    #[test]
    fn merge_then_split_round_trips() {
        let a = Batch::stack(vec![1, 2]);
        let b = Batch::stack(vec![3, 4, 5]);
        let original_len = a.size() + b.size();
        let merged = a.merge(b).unwrap();
        let (prefix, suffix) = merged.split(2);
        let rejoined = prefix.merge(suffix).unwrap();
        assert_eq!(rejoined.size(), original_len);
        assert_eq!(rejoined.items(), &[1, 2, 3, 4, 5]);
    }
}
