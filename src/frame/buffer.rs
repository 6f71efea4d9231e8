//! Latest-frame buffer
//!
//! `FrameWriter` is the producer half: it reassembles raw chunks into frames
//! and publishes each completed frame. `FrameBuffer` is the consumer half: a
//! cheap, cloneable handle that any number of tasks can wait on.
//!
//! Publishing goes through a `tokio::sync::watch` channel. The channel's single
//! lock guards the latest frame together with its version counter, and a
//! publish wakes every current waiter at once. The producer never waits on
//! consumers; `send_replace` only swaps the stored value.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::sync::watch;

use super::marker;
use crate::error::{Error, Result};
use crate::stats::StreamMetrics;

/// A complete frame as published to consumers
///
/// Cheap to clone: the payload is reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Publish order, starting at 1
    pub sequence: u64,
    /// Encoded JPEG bytes, starting with the SOI marker
    pub data: Bytes,
}

impl Frame {
    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Producer half of the frame buffer
///
/// Owns the working buffer exclusively. Every mutation takes `&mut self`, so
/// the single-writer invariant holds by construction.
pub struct FrameWriter {
    /// Bytes of the frame currently being assembled
    working: BytesMut,

    /// Latest published frame, `None` until the first publish
    tx: watch::Sender<Option<Frame>>,

    /// Sequence number of the last published frame
    sequence: u64,

    /// Counters shared with every consumer handle
    metrics: Arc<StreamMetrics>,
}

impl FrameWriter {
    /// Create a writer with fresh metrics
    pub fn new() -> Self {
        Self::with_metrics(Arc::new(StreamMetrics::new()))
    }

    /// Create a writer reporting into existing metrics
    pub fn with_metrics(metrics: Arc<StreamMetrics>) -> Self {
        let (tx, _) = watch::channel(None);

        Self {
            working: BytesMut::new(),
            tx,
            sequence: 0,
            metrics,
        }
    }

    /// Get a consumer handle for this writer's frames
    pub fn buffer(&self) -> FrameBuffer {
        FrameBuffer {
            rx: self.tx.subscribe(),
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Feed one raw chunk from the producer
    ///
    /// A chunk that starts with the SOI marker finalizes everything
    /// accumulated so far as the new latest frame and wakes all waiters. The
    /// chunk itself, marker included, then starts the next frame. Any other
    /// chunk is appended to the frame being assembled. Content is never
    /// validated.
    pub fn ingest(&mut self, chunk: &[u8]) {
        if marker::starts_frame(chunk) {
            self.publish();
        }

        self.working.extend_from_slice(chunk);
        self.metrics.record_chunk(chunk.len());
    }

    /// Publish the partially assembled frame, if any
    ///
    /// Used at end of input so the last frame of a finite source is not lost.
    pub fn flush(&mut self) {
        self.publish();
    }

    /// Number of frames published so far
    pub fn published(&self) -> u64 {
        self.sequence
    }

    /// Bytes accumulated for the frame in progress
    pub fn pending(&self) -> usize {
        self.working.len()
    }

    fn publish(&mut self) {
        // Nothing assembled yet (stream start): keep the latest frame absent
        // rather than publishing an empty one.
        if self.working.is_empty() {
            return;
        }

        let data = self.working.split().freeze();
        self.working.reserve(data.len());
        self.sequence += 1;

        tracing::trace!(
            sequence = self.sequence,
            bytes = data.len(),
            "Frame published"
        );

        self.metrics.record_publish();
        self.tx.send_replace(Some(Frame {
            sequence: self.sequence,
            data,
        }));
    }
}

impl Default for FrameWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter")
            .field("pending", &self.working.len())
            .field("sequence", &self.sequence)
            .field("consumers", &self.tx.receiver_count())
            .finish()
    }
}

/// Consumer half of the frame buffer
///
/// Clone freely; every clone observes the same frames.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    rx: watch::Receiver<Option<Frame>>,
    metrics: Arc<StreamMetrics>,
}

impl FrameBuffer {
    /// Wait for the next frame published after this call starts
    ///
    /// Wait-only semantics: the frame that is current when the call begins is
    /// never returned, so a late joiner blocks until the following publish.
    /// A publish that happens after the call starts is never missed. If several
    /// publishes happen before the caller resumes, the newest one is returned.
    ///
    /// Returns `Error::ProducerStopped` once the writer is dropped.
    pub async fn await_next_frame(&self) -> Result<Frame> {
        let mut rx = self.rx.clone();
        let _ = rx.borrow_and_update();

        rx.changed().await.map_err(|_| Error::ProducerStopped)?;

        let frame = rx.borrow_and_update().clone();
        frame.ok_or(Error::ProducerStopped)
    }

    /// The most recently published frame, without waiting
    pub fn latest(&self) -> Option<Frame> {
        self.rx.borrow().clone()
    }

    /// Whether the writer has been dropped
    pub fn is_closed(&self) -> bool {
        self.rx.has_changed().is_err()
    }

    /// Counters shared with the writer
    pub fn metrics(&self) -> &Arc<StreamMetrics> {
        &self.metrics
    }
}
