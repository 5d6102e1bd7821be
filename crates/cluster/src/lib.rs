// Rust guideline compliant 2026-07-28

//! Cluster dispatch: when a named dispatcher is not local, discover
//! candidate nodes, pick one at random, and proxy the call through --
//! retrying node re-selection (never the batch itself) up to three
//! times before surfacing `noproc`.
//!
//! Entry point: [`dispatch`]. Discovery is abstracted behind
//! [`MembershipProvider`] so any lookup mechanism (service mesh,
//! gossip, static list) satisfies the contract; [`StaticMembership`] is
//! the bundled static-list implementation.

use dispatcher::{DispatchError, DispatcherHandle, Handler};
use std::fmt;
use std::sync::Arc;

/// Maximum number of node re-selections after the first discovery,
/// per the cluster-retries invariant.
const MAX_RETRIES: u32 = 3;

/// Opaque handle to one dispatcher instance somewhere in the cluster:
/// the node that hosts it plus the dispatcher's own name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DispatcherAddress {
    node: Arc<str>,
    name: Arc<str>,
}

impl DispatcherAddress {
    #[must_use]
    pub fn new(node: impl Into<Arc<str>>, name: impl Into<Arc<str>>) -> Self {
        Self {
            node: node.into(),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn node(&self) -> &str {
        &self.node
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for DispatcherAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.name)
    }
}

/// Discovery abstraction: a lookup returning zero or more dispatcher
/// addresses for a well-known name. Looked up once per [`dispatch`]
/// call from the caller's own task, so a plain `async fn` in trait is
/// fine here -- unlike [`Handler`], nothing returned by this port ever
/// crosses a `tokio::spawn` boundary.
#[expect(
    async_fn_in_trait,
    reason = "called only from the dispatching task itself; no dyn dispatch needed"
)]
pub trait MembershipProvider {
    async fn lookup(&self, name: &str) -> Vec<DispatcherAddress>;
}

/// A fixed, in-process membership list. Useful for tests and for
/// deployments where the cluster topology is known up front rather
/// than discovered.
#[derive(Debug, Clone)]
pub struct StaticMembership {
    addresses: Vec<DispatcherAddress>,
}

impl StaticMembership {
    #[must_use]
    pub fn new(addresses: Vec<DispatcherAddress>) -> Self {
        Self { addresses }
    }
}

impl MembershipProvider for StaticMembership {
    async fn lookup(&self, name: &str) -> Vec<DispatcherAddress> {
        self.addresses
            .iter()
            .filter(|address| address.name() == name)
            .cloned()
            .collect()
    }
}

/// Errors from [`dispatch`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClusterError {
    /// No dispatcher process was found, locally or after every retry.
    #[error("no dispatcher process available for this name")]
    NoProc,
    /// The remote call itself failed once a node was resolved.
    #[error(transparent)]
    Submit(#[from] client::SubmitError),
}

/// Locate `name` in the cluster and run `batch` against it.
///
/// `resolve` turns a [`DispatcherAddress`] into a usable
/// [`DispatcherHandle`] -- in a real deployment this is the proxy spawn
/// step described in the design notes; here it is left to the caller
/// so this crate stays transport-agnostic. `distributed_preprocessing`
/// transforms the batch once before any attempt is made (e.g. to make
/// it portable across the wire); `distributed_postprocessing`
/// transforms the reassembled reply before it is returned.
///
/// # Errors
///
/// Returns [`ClusterError::NoProc`] if no address is discovered, or if
/// every resolution attempt fails after [`MAX_RETRIES`] re-selections.
/// Returns [`ClusterError::Submit`] if a resolved dispatcher rejects
/// the batch for a reason other than being gone.
pub async fn dispatch<H, M, Resolve, Pre, Post, Input, R>(
    membership: &M,
    name: &str,
    resolve: Resolve,
    input: Input,
    distributed_preprocessing: Pre,
    distributed_postprocessing: Post,
) -> Result<R, ClusterError>
where
    H: Handler,
    H::Item: Clone,
    H::Output: Clone,
    M: MembershipProvider,
    Resolve: Fn(&DispatcherAddress) -> Option<DispatcherHandle<H>>,
    Pre: FnOnce(Input) -> client::Batch<H::Item>,
    Post: FnOnce((Vec<H::Output>, H::Metadata)) -> R,
{
    let candidates = membership.lookup(name).await;
    if candidates.is_empty() {
        tracing::warn!(name, "cluster.lookup.empty");
        return Err(ClusterError::NoProc);
    }

    let batch = distributed_preprocessing(input);

    for attempt in 0..=MAX_RETRIES {
        let address = &candidates[pick_index(candidates.len())];
        tracing::debug!(attempt, address = %address, "cluster.node.selected");

        let Some(handle) = resolve(address) else {
            tracing::debug!(address = %address, "cluster.node.noproc");
            continue;
        };

        let outcome = client::execute(
            &handle,
            batch.clone(),
            |b| (client::ClientInput::single(b), ()),
            |reassembled, ()| reassembled,
        )
        .await;

        match outcome {
            Ok(reassembled) => return Ok(distributed_postprocessing(reassembled)),
            Err(client::SubmitError::Dispatch(DispatchError::NoProc | DispatchError::DispatcherGone)) => {
                tracing::debug!(address = %address, "cluster.dispatcher.noproc");
            }
            Err(other) => return Err(ClusterError::Submit(other)),
        }
    }

    Err(ClusterError::NoProc)
}

fn pick_index(len: usize) -> usize {
    use rand::Rng;
    rand::rng().random_range(0..len)
}
