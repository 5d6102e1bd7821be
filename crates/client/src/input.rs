// Rust guideline compliant 2026-07-28

use domain::Batch;
use futures::stream::BoxStream;

/// What a caller hands to [`crate::execute`] or [`crate::stream`] after
/// its own preprocessing step: either one batch, or a lazy sequence of
/// batches submitted one at a time as the dispatcher acknowledges each
/// (the spec's "streaming as lazy sequence" input side).
pub enum ClientInput<T> {
    Single(Batch<T>),
    Stream(BoxStream<'static, Batch<T>>),
}

impl<T> ClientInput<T> {
    #[must_use]
    pub fn single(batch: Batch<T>) -> Self {
        Self::Single(batch)
    }

    #[must_use]
    pub fn stream(stream: BoxStream<'static, Batch<T>>) -> Self {
        Self::Stream(stream)
    }
}
