// Rust guideline compliant 2026-07-28

//! Persisted per-dispatcher record store.
//!
//! [`Registry`] implements the "persistent key-value store" described for
//! the dispatcher: a process-wide, name-keyed table of dispatcher metadata
//! that lets a client look up `batch_size`, `batch_keys`, and serving mode
//! for a named dispatcher without a round trip to the dispatcher task
//! itself. Writes happen once, at dispatcher startup; reads are lock-free
//! (`dashmap` shards internally, unlike a single `Mutex<HashMap<_>>`).

use dashmap::DashMap;
use domain::{BatchKey, Handler, ServingMode};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// DispatcherRecord
// ---------------------------------------------------------------------------

/// Everything a client needs to validate and shape a submission before
/// ever sending a message to the dispatcher task.
#[derive(Debug)]
pub struct DispatcherRecord<H: Handler> {
    pub name: Arc<str>,
    pub limit: usize,
    pub mode: ServingMode,
    pub batch_keys: Arc<[BatchKey]>,
    _marker: std::marker::PhantomData<fn() -> H>,
}

impl<H: Handler> DispatcherRecord<H> {
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>, limit: usize, mode: ServingMode, batch_keys: Vec<BatchKey>) -> Self {
        Self {
            name: name.into(),
            limit,
            mode,
            batch_keys: Arc::from(batch_keys),
            _marker: std::marker::PhantomData,
        }
    }

    #[must_use]
    pub fn allows_key(&self, key: &BatchKey) -> bool {
        self.batch_keys.iter().any(|k| k == key)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Name -> record table for every dispatcher started with a given handler
/// type `H`. One `Registry<H>` is shared (via `Arc`) by every dispatcher
/// and client using that handler type within a process.
#[derive(Debug)]
pub struct Registry<H: Handler> {
    records: DashMap<Arc<str>, Arc<DispatcherRecord<H>>>,
}

impl<H: Handler> Registry<H> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Publish a dispatcher's record, overwriting any prior record under
    /// the same name (e.g. after a restart).
    pub fn register(&self, record: DispatcherRecord<H>) {
        tracing::debug!(name = %record.name, "registry.register");
        self.records.insert(Arc::clone(&record.name), Arc::new(record));
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<DispatcherRecord<H>>> {
        self.records.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn deregister(&self, name: &str) {
        tracing::debug!(name, "registry.deregister");
        self.records.remove(name);
    }
}

impl<H: Handler> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}
