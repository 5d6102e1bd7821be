// Rust guideline compliant 2026-07-28

//! Keyed dispatch demo: one dispatcher, two declared keys, each routed
//! to a different arm of the compute function by inspecting the
//! sealed batch's own key. `:double` multiplies by two, `:half`
//! divides by two; both keys share the same accumulator limit and
//! partition pool.
//!
//! # Usage
//!
//! ```text
//! RUST_LOG=info cargo run --bin batch_serving_keyed
//! ```

use anyhow::Context as _;
use dispatcher::{start, Batch, BatchKey, ServingConfig};
use domain::{FnHandlerError, Handler};
use std::future::Future;

struct ScaleHandler {
    double_key: BatchKey,
}

impl Handler for ScaleHandler {
    type Item = f64;
    type Output = f64;
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
        let scale = if *batch.key() == self.double_key { 2.0 } else { 0.5 };
        async move {
            let out = batch.into_items().into_iter().map(|v| v * scale).collect();
            Ok((out, ()))
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let double_key = BatchKey::new("double");
    let half_key = BatchKey::new("half");

    let config = ServingConfig::builder(
        "scaler",
        ScaleHandler {
            double_key: double_key.clone(),
        },
    )
    .batch_size(16)
    .batch_keys(vec![double_key.clone(), half_key.clone()])
    .build()
    .context("failed to build serving config")?;

    let (handle, join) = start(config);

    let inputs: Vec<f64> = (0..10).map(f64::from).collect();

    let doubled = client::execute(
        &handle,
        Batch::stack(inputs.clone()).with_key(double_key),
        |batch| (client::ClientInput::single(batch), ()),
        |(items, _metadata), ()| items,
    )
    .await
    .context("doubled submission failed")?;

    let halved = client::execute(
        &handle,
        Batch::stack(inputs).with_key(half_key),
        |batch| (client::ClientInput::single(batch), ()),
        |(items, _metadata), ()| items,
    )
    .await
    .context("halved submission failed")?;

    tracing::info!(?doubled, ?halved, "batch_serving_keyed.complete");

    drop(handle);
    join.await.context("dispatcher task panicked")?;
    Ok(())
}
