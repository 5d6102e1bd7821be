// Rust guideline compliant 2026-07-28

//! Batching dispatcher server demo.
//!
//! Starts a single dispatcher serving a `square` compute function in
//! `execute` mode, registers its metadata in the shared [`registry`],
//! and submits two concurrent client calls against it -- the
//! large-limit, two-submission-merge scenario. Runs the calls to
//! completion, racing against CTRL+C for a clean shutdown.
//!
//! # Usage
//!
//! ```text
//! RUST_LOG=info cargo run --bin batch_serving
//! ```

use anyhow::Context as _;
use dispatcher::{start, Batch, ServingConfig};
use domain::{FnHandlerError, Handler};
use registry::{DispatcherRecord, Registry};
use std::future::Future;
use std::time::Duration;
use tracing::Instrument as _;

/// Squares every item in the batch; no metadata, no per-partition state.
struct SquareHandler;

impl Handler for SquareHandler {
    type Item = i64;
    type Output = i64;
    type Metadata = ();
    type State = ();
    type Error = FnHandlerError;

    fn init(&self, partitions: usize) -> Vec<Self::State> {
        vec![(); partitions]
    }

    fn handle_batch(
        &self,
        batch: Batch<Self::Item>,
        _partition: usize,
        _state: &mut Self::State,
        _hooks: &domain::HookSink<Self::Output>,
    ) -> impl Future<Output = Result<(Vec<Self::Output>, Self::Metadata), Self::Error>> + Send {
        async move {
            let out = batch.into_items().into_iter().map(|v| v * v).collect();
            Ok((out, ()))
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServingConfig::builder("squares", SquareHandler)
        .batch_size(10)
        .batch_timeout(Duration::from_millis(100))
        .build()
        .context("failed to build serving config")?;

    let registry: Registry<SquareHandler> = Registry::new();
    registry.register(DispatcherRecord::new(
        "squares",
        config.batch_size(),
        config.mode(),
        config.batch_keys().to_vec(),
    ));

    let (handle, join) = start(config);

    let calls = async {
        let a = client::execute(
            &handle,
            vec![1, 2, 3],
            |items| (client::ClientInput::single(Batch::stack(items)), ()),
            |(items, _metadata), ()| items,
        );
        let b = client::execute(
            &handle,
            vec![4, 5],
            |items| (client::ClientInput::single(Batch::stack(items)), ()),
            |(items, _metadata), ()| items,
        );
        let (a, b) = tokio::join!(a, b);
        tracing::info!(?a, ?b, "batch_serving.calls.complete");
        anyhow::Ok(())
    }
    .instrument(tracing::info_span!("calls"));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("main.shutdown: ctrl_c received");
        }
        result = calls => {
            result.context("client calls failed")?;
        }
    }

    registry.deregister("squares");
    drop(handle);
    join.await.context("dispatcher task panicked")?;
    Ok(())
}
