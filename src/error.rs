//! Error types
//!
//! A single error enum shared by the frame core, the HTTP server and the
//! producer sources.

use std::process::ExitStatus;
use std::time::Duration;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for streaming operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport or source I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The frame producer went away; no further frames will be published
    #[error("frame producer stopped")]
    ProducerStopped,

    /// No frame was published within the allowed wait
    #[error("no frame published within {0:?}")]
    FrameTimeout(Duration),

    /// A stream client did not take a whole frame within the allowed time
    #[error("client did not accept a frame within {0:?}")]
    WriteTimeout(Duration),

    /// JPEG encoding of a synthetic frame failed
    #[error("jpeg encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    /// External capture command exited unsuccessfully
    #[error("source process exited with {0}")]
    SourceExited(ExitStatus),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error means the client went away mid-write
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}
