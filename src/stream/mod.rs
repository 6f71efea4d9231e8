//! Client-side streaming
//!
//! - Multipart framing for `multipart/x-mixed-replace` responses
//! - `StreamBroadcaster`, the per-client frame loop

pub mod broadcaster;
pub mod multipart;

pub use broadcaster::StreamBroadcaster;
