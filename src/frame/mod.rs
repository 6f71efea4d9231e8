//! Single-producer, multi-consumer frame distribution
//!
//! The producer pushes raw chunks through a `FrameWriter`; completed frames are
//! published to every `FrameBuffer` handle at once.
//!
//! # Architecture
//!
//! ```text
//!   camera thread                    shared                      stream tasks
//!  ┌──────────────┐       ┌─────────────────────────┐
//!  │ FrameWriter  │       │ watch::Sender/Receiver  │      ┌──► await_next_frame() ──► client A
//!  │  working buf ├──────►│   Option<Frame>         ├──────┼──► await_next_frame() ──► client B
//!  │  ingest()    │publish│   (latest value only)   │ wake └──► await_next_frame() ──► client C
//!  └──────────────┘       └─────────────────────────┘ all
//! ```
//!
//! Consumers never queue: a slow consumer skips to whatever frame is current
//! when it next waits and resumes. Payloads are `bytes::Bytes`, so every
//! consumer shares one allocation per frame.

pub mod buffer;
pub mod marker;

pub use buffer::{Frame, FrameBuffer, FrameWriter};
pub use marker::FRAME_MARKER;
