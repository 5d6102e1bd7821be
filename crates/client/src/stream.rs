// Rust guideline compliant 2026-07-28

use dispatcher::{DispatchError, Handler, WaiterEvent};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// One delivered slice of a `batches` or `hooks` mode run.
pub enum StreamItem<H: Handler> {
    Batch {
        start: usize,
        size: usize,
        output: Arc<[H::Output]>,
        metadata: H::Metadata,
    },
    Hook {
        start: usize,
        size: usize,
        output: Arc<[H::Output]>,
        hook_name: Arc<str>,
    },
}

/// A lazy sequence of this submission's replies, in receipt order.
///
/// Bound to the task that created it: the dispatcher hands every
/// waiter exactly one reply channel, and this type polls it directly
/// rather than buffering into a shared structure, so only the creating
/// task may ever poll it.
pub struct BatchStream<H: Handler> {
    rx: mpsc::Receiver<WaiterEvent<H>>,
    owner: tokio::task::Id,
}

impl<H: Handler> BatchStream<H> {
    pub(crate) fn new(rx: mpsc::Receiver<WaiterEvent<H>>) -> Self {
        Self {
            rx,
            owner: tokio::task::id(),
        }
    }
}

impl<H: Handler> Stream for BatchStream<H> {
    type Item = Result<StreamItem<H>, DispatchError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        debug_assert_eq!(
            tokio::task::id(),
            self.owner,
            "BatchStream polled from a task other than the one that created it"
        );
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(WaiterEvent::Batch { start, size, output, metadata })) => {
                Poll::Ready(Some(Ok(StreamItem::Batch { start, size, output, metadata })))
            }
            Poll::Ready(Some(WaiterEvent::Hook { start, size, output, hook_name })) => {
                Poll::Ready(Some(Ok(StreamItem::Hook { start, size, output, hook_name })))
            }
            Poll::Ready(Some(WaiterEvent::Down(reason))) => Poll::Ready(Some(Err(reason))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
