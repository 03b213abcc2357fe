// src/stream.rs
//! Drives an engine over an asynchronous fragment source. Fragments arrive
//! with arbitrary boundaries (an SSE body, a channel fed by a decoder task)
//! and each one is pushed through the bound engine as it lands.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc::Receiver;

use crate::engine::Engine;
use crate::parser::{ChunkResult, StreamOutcome};

/// Adapter that turns a stream of raw text fragments into a stream of
/// demultiplexed deltas. Empty results (a fragment wholly absorbed into a
/// pending partial tag) are skipped rather than yielded.
pub struct DemuxStream<S> {
    inner: S,
    engine: Box<dyn Engine>,
    exhausted: bool,
}

impl<S> DemuxStream<S>
where
    S: Stream<Item = String> + Unpin,
{
    pub fn new(inner: S, engine: Box<dyn Engine>) -> Self {
        Self {
            inner,
            engine,
            exhausted: false,
        }
    }

    /// Close out the stream once the source is drained. Flushes any retained
    /// partial tag and force-closes an open call block.
    pub fn finalize(&mut self, finish_reason: Option<String>) -> StreamOutcome {
        self.engine.finalize(finish_reason)
    }
}

impl<S> Stream for DemuxStream<S>
where
    S: Stream<Item = String> + Unpin,
{
    type Item = ChunkResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.exhausted {
            return Poll::Ready(None);
        }
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(fragment)) => {
                    let result = self.engine.process_chunk(&fragment);
                    if !result.is_empty() {
                        return Poll::Ready(Some(result));
                    }
                    // Fragment fully buffered; keep polling.
                }
                Poll::Ready(None) => {
                    self.exhausted = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Feed every fragment from `source` through `engine`, invoking `on_delta`
/// for each non-empty result, and return the finalized outcome.
pub async fn drive<S, E, F>(
    mut engine: E,
    mut source: S,
    mut on_delta: F,
    finish_reason: Option<String>,
) -> StreamOutcome
where
    S: Stream<Item = String> + Unpin,
    E: Engine,
    F: FnMut(&ChunkResult),
{
    while let Some(fragment) = source.next().await {
        let result = engine.process_chunk(&fragment);
        if !result.is_empty() {
            on_delta(&result);
        }
    }
    engine.finalize(finish_reason)
}

/// Like [`drive`], but fed from a tokio channel. This is the shape a decoder
/// task uses: it sends fragments as they are produced and drops the sender
/// when generation stops.
pub async fn drive_channel<E, F>(
    mut engine: E,
    mut source: Receiver<String>,
    mut on_delta: F,
    finish_reason: Option<String>,
) -> StreamOutcome
where
    E: Engine,
    F: FnMut(&ChunkResult),
{
    while let Some(fragment) = source.recv().await {
        let result = engine.process_chunk(&fragment);
        if !result.is_empty() {
            on_delta(&result);
        }
    }
    engine.finalize(finish_reason)
}
