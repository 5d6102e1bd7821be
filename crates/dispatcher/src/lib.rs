// Rust guideline compliant 2026-07-28

//! Batching request dispatcher: accumulates items from many concurrent
//! callers into size- or timeout-bounded batches, routes each through a
//! user-supplied [`domain::Handler`], and slices the aggregate output
//! back to each originating caller.
//!
//! Entry point: [`engine::start`], which spawns the partition pool and
//! the single dispatcher task and returns a cloneable
//! [`engine::DispatcherHandle`]. Configuration via
//! [`config::ServingConfig::builder`].

mod accumulator;
mod config;
mod engine;
mod error;
mod message;
mod partition;

pub use config::{ServingConfig, ServingConfigBuilder};
pub use engine::{start, DispatcherHandle};
pub use error::{ConfigError, DispatchError};
pub use message::{WaiterEvent, WaiterRefs};

pub use domain::{Batch, BatchError, BatchKey, Handler, ServingMode};
