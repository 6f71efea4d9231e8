//! Per-client streaming loop
//!
//! A `StreamBroadcaster` owns one client's output and repeatedly waits for the
//! next frame, writing each as a multipart part. The first failed write ends
//! the loop; nothing is retried and nothing propagates to the producer or to
//! other clients.
//!
//! Both the wait and the write race the shutdown signal, and each can be
//! bounded: a client that stops reading is dropped once a frame write
//! exceeds the write timeout.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::multipart;
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameBuffer};

/// Drives one client connection against a shared `FrameBuffer`
///
/// Started on construction; `run` consumes it and releases the output when
/// it returns, so a closed broadcaster cannot be reused.
pub struct StreamBroadcaster<W> {
    /// Unique session ID
    session_id: u64,

    /// Remote peer address
    peer_addr: SocketAddr,

    /// Client output; exclusively owned
    writer: W,

    /// Source of frames
    buffer: FrameBuffer,

    /// Longest wait for a frame before the client is dropped
    idle_timeout: Option<Duration>,

    /// Longest time one frame may take to write
    write_timeout: Option<Duration>,

    /// Server shutdown signal
    cancel: CancellationToken,

    /// Sequence of the last frame written
    last_sequence: u64,

    frames_sent: u64,
}

impl<W: AsyncWrite + Unpin> StreamBroadcaster<W> {
    /// Create a broadcaster for a freshly connected client
    pub fn new(session_id: u64, peer_addr: SocketAddr, writer: W, buffer: FrameBuffer) -> Self {
        Self {
            session_id,
            peer_addr,
            writer,
            buffer,
            idle_timeout: None,
            write_timeout: None,
            cancel: CancellationToken::new(),
            last_sequence: 0,
            frames_sent: 0,
        }
    }

    /// Drop the client if no frame arrives within `timeout`
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Drop the client if writing one frame takes longer than `timeout`
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Stop streaming when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the stream until the client fails or the stream ends
    ///
    /// Returns `Ok(())` when the producer stops or the server shuts down; the
    /// output is shut down cleanly in that case. Returns the error when a write
    /// fails or times out, or no frame arrives within the idle timeout. Either
    /// way the output is released when this returns.
    pub async fn run(mut self) -> Result<()> {
        let metrics = self.buffer.metrics().clone();
        metrics.connection_opened();

        tracing::debug!(
            session_id = self.session_id,
            peer = %self.peer_addr,
            "Stream client started"
        );

        let result = self.stream_frames().await;
        self.close(result.is_ok()).await;

        metrics.connection_closed(result.is_err());
        result
    }

    async fn stream_frames(&mut self) -> Result<()> {
        let cancel = self.cancel.clone();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = self.next_frame() => next,
            };

            let frame = match next {
                Ok(frame) => frame,
                Err(Error::ProducerStopped) => return Ok(()),
                Err(e) => return Err(e),
            };

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                written = self.send_frame(&frame) => written?,
            }
        }
    }

    async fn next_frame(&self) -> Result<Frame> {
        match self.idle_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.buffer.await_next_frame())
                .await
                .map_err(|_| Error::FrameTimeout(timeout))?,
            None => self.buffer.await_next_frame().await,
        }
    }

    async fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        match self.write_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.write_frame(frame))
                .await
                .map_err(|_| Error::WriteTimeout(timeout))?,
            None => self.write_frame(frame).await,
        }
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.last_sequence > 0 && frame.sequence > self.last_sequence + 1 {
            self.buffer
                .metrics()
                .record_skipped(frame.sequence - self.last_sequence - 1);
        }
        self.last_sequence = frame.sequence;

        let header = multipart::part_header(frame.len());
        self.writer.write_all(&header).await?;
        self.writer.write_all(&frame.data).await?;
        self.writer.write_all(multipart::PART_TRAILER).await?;
        self.writer.flush().await?;

        self.frames_sent += 1;
        self.buffer
            .metrics()
            .record_frame_sent(multipart::part_size(frame.len()));
        Ok(())
    }

    async fn close(&mut self, graceful: bool) {
        if graceful {
            // Best effort; the client may already be gone
            let _ = self.writer.shutdown().await;
        }

        tracing::debug!(
            session_id = self.session_id,
            peer = %self.peer_addr,
            frames_sent = self.frames_sent,
            "Stream client closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use tokio::io::AsyncReadExt;
    use tokio::task::JoinHandle;
    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;
    use crate::frame::{FrameWriter, FRAME_MARKER};

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    fn jpeg(payload: &[u8]) -> Vec<u8> {
        let mut data = FRAME_MARKER.to_vec();
        data.extend_from_slice(payload);
        data
    }

    fn part(data: &[u8]) -> Vec<u8> {
        let mut out = multipart::part_header(data.len()).to_vec();
        out.extend_from_slice(data);
        out.extend_from_slice(b"\r\n");
        out
    }

    /// Camera stand-in publishing the same frame until cancelled
    fn spawn_producer(
        mut writer: FrameWriter,
        frame: Vec<u8>,
        stop: CancellationToken,
    ) -> JoinHandle<FrameWriter> {
        tokio::spawn(async move {
            loop {
                writer.ingest(&frame);
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(5)) => {}
                }
            }
            writer
        })
    }

    #[tokio::test]
    async fn test_writes_multipart_parts() {
        let writer = FrameWriter::new();
        let buffer = writer.buffer();
        let frame = jpeg(b"image");

        let mock = tokio_test::io::Builder::new()
            .write(&part(&frame))
            .write(&part(&frame))
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "client gone"))
            .build();

        let stop = CancellationToken::new();
        let producer = spawn_producer(writer, frame, stop.clone());

        let result = StreamBroadcaster::new(1, peer(), mock, buffer.clone())
            .run()
            .await;

        stop.cancel();
        producer.await.unwrap();

        let err = result.unwrap_err();
        assert!(err.is_disconnect());

        let stats = buffer.metrics().snapshot();
        assert_eq!(stats.frames_sent, 2);
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.failed_connections, 1);
    }

    #[tokio::test]
    async fn test_closes_cleanly_when_producer_stops() {
        let writer = FrameWriter::new();
        let buffer = writer.buffer();
        let mock = tokio_test::io::Builder::new().build();

        let handle = tokio::spawn(StreamBroadcaster::new(2, peer(), mock, buffer.clone()).run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(writer);

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(buffer.metrics().snapshot().failed_connections, 0);
    }

    #[tokio::test]
    async fn test_idle_timeout() {
        let writer = FrameWriter::new();
        let mock = tokio_test::io::Builder::new().build();

        let result = StreamBroadcaster::new(3, peer(), mock, writer.buffer())
            .idle_timeout(Duration::from_millis(50))
            .run()
            .await;

        assert!(matches!(result, Err(Error::FrameTimeout(_))));
        drop(writer);
    }

    #[tokio::test]
    async fn test_cancellation_ends_stream() {
        let writer = FrameWriter::new();
        let cancel = CancellationToken::new();
        let (client, _server) = tokio::io::duplex(1024);

        let broadcaster = StreamBroadcaster::new(4, peer(), client, writer.buffer())
            .with_cancellation(cancel.clone());

        let handle = tokio::spawn(broadcaster.run());
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        drop(writer);
    }

    #[tokio::test]
    async fn test_write_timeout_drops_stalled_client() {
        let mut writer = FrameWriter::new();
        let buffer = writer.buffer();
        // The client never reads, so writes stall once the pipe is full
        let (out, _stalled) = tokio::io::duplex(16);

        let handle = tokio::spawn(
            StreamBroadcaster::new(6, peer(), out, buffer.clone())
                .write_timeout(Duration::from_millis(50))
                .run(),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;

        writer.ingest(&jpeg(&[0u8; 1024]));
        writer.ingest(&jpeg(b"next"));

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(Error::WriteTimeout(_))));

        let stats = buffer.metrics().snapshot();
        assert_eq!(stats.frames_sent, 0);
        assert_eq!(stats.failed_connections, 1);
        assert_eq!(stats.active_connections, 0);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_stalled_write() {
        let mut writer = FrameWriter::new();
        let buffer = writer.buffer();
        let cancel = CancellationToken::new();
        let (out, _stalled) = tokio::io::duplex(16);

        let handle = tokio::spawn(
            StreamBroadcaster::new(7, peer(), out, buffer.clone())
                .with_cancellation(cancel.clone())
                .run(),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;

        writer.ingest(&jpeg(&[0u8; 1024]));
        writer.ingest(&jpeg(b"next"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(buffer.metrics().snapshot().failed_connections, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_client_does_not_affect_others() {
        let writer = FrameWriter::new();
        let buffer = writer.buffer();
        let frame = jpeg(b"shared frame");

        let (healthy_out, mut healthy_in) = tokio::io::duplex(64 * 1024);
        let (failing_out, failing_in) = tokio::io::duplex(64 * 1024);

        let healthy = tokio::spawn(StreamBroadcaster::new(10, peer(), healthy_out, buffer.clone()).run());
        let failing = tokio::spawn(StreamBroadcaster::new(11, peer(), failing_out, buffer.clone()).run());

        let stop = CancellationToken::new();
        let producer = spawn_producer(writer, frame.clone(), stop.clone());

        // Client disconnects: the next write on its stream fails
        drop(failing_in);
        let failed = tokio::time::timeout(Duration::from_secs(5), failing)
            .await
            .unwrap()
            .unwrap();
        assert!(failed.unwrap_err().is_disconnect());

        let published_at_failure = buffer.metrics().snapshot().frames_published;

        // The healthy client keeps receiving whole parts
        let expected = part(&frame);
        let mut received = vec![0u8; expected.len() * 3];
        tokio::time::timeout(Duration::from_secs(5), healthy_in.read_exact(&mut received))
            .await
            .unwrap()
            .unwrap();
        for chunk in received.chunks(expected.len()) {
            assert_eq!(chunk, &expected[..]);
        }

        // And the producer keeps publishing
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(buffer.metrics().snapshot().frames_published > published_at_failure);

        stop.cancel();
        let writer = producer.await.unwrap();
        drop(writer);

        let healthy = tokio::time::timeout(Duration::from_secs(5), healthy)
            .await
            .unwrap()
            .unwrap();
        assert!(healthy.is_ok());
    }

    #[test]
    fn test_counts_skipped_frames() {
        let mut writer = FrameWriter::new();
        let buffer = writer.buffer();
        let (out, _input) = tokio::io::duplex(64 * 1024);

        let mut run = task::spawn(StreamBroadcaster::new(5, peer(), out, buffer.clone()).run());

        writer.ingest(&jpeg(b"0"));
        assert_pending!(run.poll());

        // Sequence 1 is written, then the client waits again
        writer.ingest(&jpeg(b"1"));
        assert_pending!(run.poll());

        // Three publishes before the client resumes; only the newest is sent
        writer.ingest(&jpeg(b"2"));
        writer.ingest(&jpeg(b"3"));
        writer.ingest(&jpeg(b"4"));
        assert_pending!(run.poll());

        let stats = buffer.metrics().snapshot();
        assert_eq!(stats.frames_published, 4);
        assert_eq!(stats.frames_sent, 2);
        assert_eq!(stats.frames_skipped, 2);
        assert_eq!(stats.active_connections, 1);

        drop(writer);
        assert!(assert_ready!(run.poll()).is_ok());
        assert_eq!(buffer.metrics().snapshot().active_connections, 0);
    }
}
