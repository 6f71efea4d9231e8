//! Statistics for the frame stream and its clients

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live counters shared by the producer and every stream client
///
/// All updates are relaxed atomic increments; readers take a `StreamStats`
/// snapshot.
#[derive(Debug)]
pub struct StreamMetrics {
    started_at: Instant,
    chunks_ingested: AtomicU64,
    bytes_ingested: AtomicU64,
    frames_published: AtomicU64,
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    failed_connections: AtomicU64,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    frames_skipped: AtomicU64,
}

impl StreamMetrics {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            chunks_ingested: AtomicU64::new(0),
            bytes_ingested: AtomicU64::new(0),
            frames_published: AtomicU64::new(0),
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            failed_connections: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
        }
    }

    /// Record one chunk handed to the writer
    pub fn record_chunk(&self, len: usize) {
        self.chunks_ingested.fetch_add(1, Ordering::Relaxed);
        self.bytes_ingested.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Record one published frame
    pub fn record_publish(&self) {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a new stream client
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a stream client going away
    pub fn connection_closed(&self, failed: bool) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
        if failed {
            self.failed_connections.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record one frame written to a client
    pub fn record_frame_sent(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record frames a client never saw
    pub fn record_skipped(&self, frames: u64) {
        self.frames_skipped.fetch_add(frames, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot
    pub fn snapshot(&self) -> StreamStats {
        StreamStats {
            uptime: self.started_at.elapsed(),
            chunks_ingested: self.chunks_ingested.load(Ordering::Relaxed),
            bytes_ingested: self.bytes_ingested.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            failed_connections: self.failed_connections.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
        }
    }
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of stream statistics
#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    /// Time since the metrics were created
    pub uptime: Duration,
    /// Chunks received from the producer
    pub chunks_ingested: u64,
    /// Bytes received from the producer
    pub bytes_ingested: u64,
    /// Complete frames published
    pub frames_published: u64,
    /// Stream clients ever connected
    pub total_connections: u64,
    /// Stream clients currently connected
    pub active_connections: u64,
    /// Stream clients dropped on error
    pub failed_connections: u64,
    /// Frames written across all clients
    pub frames_sent: u64,
    /// Bytes written across all clients, framing included
    pub bytes_sent: u64,
    /// Frames published but skipped by a slow client
    pub frames_skipped: u64,
}

impl StreamStats {
    /// Ingest bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.uptime.as_secs();
        if secs > 0 {
            (self.bytes_ingested * 8) / secs
        } else {
            0
        }
    }

    /// Average published frame rate
    pub fn framerate(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs > 0.0 {
            self.frames_published as f64 / secs
        } else {
            0.0
        }
    }
}
