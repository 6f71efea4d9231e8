//! MJPEG camera streaming over HTTP
//!
//! One producer thread feeds camera chunks into a [`FrameWriter`], which
//! reassembles them into JPEG frames and publishes the newest one. Any number
//! of HTTP clients wait on the shared [`FrameBuffer`] and receive each frame
//! as a part of a `multipart/x-mixed-replace` response.
//!
//! ```no_run
//! use mjpeg_rs::source::{self, CameraConfig, SourceConfig};
//! use mjpeg_rs::{FrameWriter, ServerConfig, StreamServer};
//!
//! # async fn run() -> mjpeg_rs::Result<()> {
//! let writer = FrameWriter::new();
//! let server = StreamServer::new(ServerConfig::default(), writer.buffer());
//!
//! source::spawn(SourceConfig::TestPattern, CameraConfig::default(), writer)?;
//! server.run().await
//! # }
//! ```
//!
//! Slow clients skip frames; they never hold up the producer or each other.

pub mod error;
pub mod frame;
pub mod server;
pub mod source;
pub mod stats;
pub mod stream;

pub use error::{Error, Result};
pub use frame::{Frame, FrameBuffer, FrameWriter};
pub use server::{IndexPage, ServerConfig, StreamServer};
pub use stats::{StreamMetrics, StreamStats};
pub use stream::StreamBroadcaster;
