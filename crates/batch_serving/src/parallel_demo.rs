// Rust guideline compliant 2026-07-28

//! Parallel-partitions demo: four partitions, a handler that sleeps
//! roughly two seconds before squaring its batch, four concurrent
//! size-2 calls. If the partitions genuinely run in parallel, wall
//! time stays close to the handler's own latency rather than growing
//! with the number of calls.
//!
//! # Usage
//!
//! ```text
//! RUST_LOG=info cargo run --bin batch_serving_parallel
//! ```

use anyhow::Context as _;
use dispatcher::{start, Batch, ServingConfig};
use domain::{FnHandlerError, Handler};
use std::future::Future;
use std::time::{Duration, Instant};

const PARTITIONS: usize = 4;
const HANDLER_DELAY: Duration = Duration::from_millis(2_000);

/// Sleeps for [`HANDLER_DELAY`] then squares every item; the sleep
/// models a slow model call whose latency does not depend on batch
/// size, so the only way to keep overall wall time flat is to run the
/// four partitions concurrently.
struct SlowSquareHandler;

impl Handler for SlowSquareHandler {
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
            tokio::time::sleep(HANDLER_DELAY).await;
            let out = batch.into_items().into_iter().map(|v| v * v).collect();
            Ok((out, ()))
        }
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServingConfig::builder("slow_squares", SlowSquareHandler)
        .batch_size(2)
        .batch_timeout(Duration::from_millis(50))
        .partitions(PARTITIONS)
        .build()
        .context("failed to build serving config")?;

    let (handle, join) = start(config);

    let started = Instant::now();

    let calls = (0..PARTITIONS).map(|i| {
        let base = (i as i64) * 2;
        client::execute(
            &handle,
            vec![base, base + 1],
            |items| (client::ClientInput::single(Batch::stack(items)), ()),
            |(items, _metadata), ()| items,
        )
    });

    let results = futures::future::try_join_all(calls)
        .await
        .context("a parallel client call failed")?;

    let elapsed = started.elapsed();
    tracing::info!(?results, ?elapsed, "batch_serving_parallel.complete");

    if elapsed > HANDLER_DELAY + Duration::from_millis(100) {
        tracing::warn!(
            ?elapsed,
            "batch_serving_parallel.slower_than_expected: partitions may not have run concurrently"
        );
    }

    drop(handle);
    join.await.context("dispatcher task panicked")?;
    Ok(())
}
