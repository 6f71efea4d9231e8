//! HTTP server
//!
//! Serves the landing page and fans the latest frame out to every
//! `/stream.mjpg` client.

pub mod config;
pub mod listener;
pub mod page;
pub(crate) mod routes;

pub use config::ServerConfig;
pub use listener::StreamServer;
pub use page::IndexPage;
