//! Byte stream to frame chunks
//!
//! Camera drivers hand over MJPEG data in writes that line up with frame
//! starts. Pipes and files don't, so `MjpegChunker` re-cuts an arbitrary byte
//! stream at every SOI marker before it reaches `FrameWriter::ingest`.
//!
//! The header segments of each frame are walked rather than scanned, so an
//! SOI inside an APPn payload (an EXIF thumbnail) does not split the frame.

use std::io::{self, Read};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::error::Result;
use crate::frame::marker::{self, HeaderScan};
use crate::frame::FrameWriter;

/// Read size per `read` call
const READ_SIZE: usize = 64 * 1024;

/// Largest chunk handed out without seeing a marker
const MAX_CHUNK: usize = 1024 * 1024;

/// Splits a byte stream into chunks that begin at frame boundaries
///
/// Every returned chunk either starts with the SOI marker (a new frame) or
/// continues the previous one. A marker split across two reads is kept
/// together.
pub struct MjpegChunker<R> {
    reader: R,
    pending: BytesMut,
    scratch: Vec<u8>,
    max_chunk: usize,
    frame_interval: Option<Duration>,
    eof: bool,
}

impl<R: Read> MjpegChunker<R> {
    /// Create a chunker over `reader`
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: BytesMut::with_capacity(READ_SIZE),
            scratch: vec![0; READ_SIZE],
            max_chunk: MAX_CHUNK,
            frame_interval: None,
            eof: false,
        }
    }

    /// Release at most `fps` frames per second
    ///
    /// For recorded input that would otherwise be read as fast as possible.
    pub fn paced(mut self, fps: u32) -> Self {
        self.frame_interval = if fps > 0 {
            Some(Duration::from_secs(1) / fps)
        } else {
            None
        };
        self
    }

    /// Set the largest chunk handed out without a marker
    pub fn max_chunk(mut self, size: usize) -> Self {
        self.max_chunk = size.max(2);
        self
    }

    /// Next chunk, or `None` at end of input
    pub fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        loop {
            // A marker at position 0 starts the chunk being cut, not a new one
            let from = if marker::starts_frame(&self.pending) {
                match marker::scan_header(&self.pending) {
                    HeaderScan::Complete(pos) | HeaderScan::Invalid(pos) => pos,
                    HeaderScan::Incomplete
                        if !self.eof && self.pending.len() < self.max_chunk =>
                    {
                        self.fill()?;
                        continue;
                    }
                    HeaderScan::Incomplete => 1,
                }
            } else {
                1
            };

            if let Some(pos) = marker::find_marker(&self.pending, from) {
                return Ok(Some(self.pending.split_to(pos).freeze()));
            }

            if self.eof {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.pending.split().freeze()));
            }

            if self.pending.len() >= self.max_chunk {
                // A trailing 0xFF may be the first half of a marker
                let keep = usize::from(self.pending.last() == Some(&marker::FRAME_MARKER[0]));
                let at = self.pending.len() - keep;
                if at > 0 {
                    return Ok(Some(self.pending.split_to(at).freeze()));
                }
            }

            self.fill()?;
        }
    }

    /// Feed the whole stream into `writer`
    ///
    /// Flushes the last frame at end of input and returns the number of
    /// frames published.
    pub fn run(mut self, writer: &mut FrameWriter) -> Result<u64> {
        let mut next_frame = Instant::now();

        while let Some(chunk) = self.next_chunk()? {
            if let Some(interval) = self.frame_interval {
                if marker::starts_frame(&chunk) {
                    let now = Instant::now();
                    if next_frame > now {
                        std::thread::sleep(next_frame - now);
                    }
                    next_frame = next_frame.max(now) + interval;
                }
            }

            writer.ingest(&chunk);
        }

        writer.flush();
        tracing::debug!(frames = writer.published(), "End of input");
        Ok(writer.published())
    }

    fn fill(&mut self) -> io::Result<()> {
        loop {
            match self.reader.read(&mut self.scratch) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(());
                }
                Ok(n) => {
                    self.pending.extend_from_slice(&self.scratch[..n]);
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
