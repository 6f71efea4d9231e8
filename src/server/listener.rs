//! MJPEG server listener
//!
//! Binds the HTTP listener, serves the routes and spawns the periodic stats
//! task. Each stream client gets its own task, spawned by the stream route.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::ServerConfig;
use super::page::IndexPage;
use super::routes::{self, AppState};
use crate::error::Result;
use crate::frame::FrameBuffer;

/// MJPEG HTTP server
pub struct StreamServer {
    config: Arc<ServerConfig>,
    buffer: FrameBuffer,
    page: IndexPage,
    next_session_id: Arc<AtomicU64>,
    connection_semaphore: Option<Arc<Semaphore>>,
    cancel: CancellationToken,
}

impl StreamServer {
    /// Create a new server serving frames from `buffer`
    pub fn new(config: ServerConfig, buffer: FrameBuffer) -> Self {
        Self::with_page(config, buffer, IndexPage::default())
    }

    /// Create a new server with a custom landing page
    pub fn with_page(config: ServerConfig, buffer: FrameBuffer, page: IndexPage) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config: Arc::new(config),
            buffer,
            page,
            next_session_id: Arc::new(AtomicU64::new(1)),
            connection_semaphore,
            cancel: CancellationToken::new(),
        }
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the listener fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` completes
    ///
    /// On shutdown every stream client is closed so in-flight responses can
    /// finish. Connections still open after `shutdown_timeout` (a client that
    /// stopped reading) are abandoned. A server is single-use: once shut down
    /// it cannot serve again.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "MJPEG server listening");

        let stats_handle = self.spawn_stats_task();

        let cancel = self.cancel.clone();
        let app = routes::router(self.state());
        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
            cancel.cancel();
        });

        let cancelled = self.cancel.clone();
        let shutdown_timeout = self.config.shutdown_timeout;
        let result = tokio::select! {
            result = server.into_future() => result,
            _ = async move {
                cancelled.cancelled().await;
                tokio::time::sleep(shutdown_timeout).await;
            } => {
                tracing::warn!(
                    timeout = ?shutdown_timeout,
                    "Graceful shutdown timed out, abandoning open connections"
                );
                Ok(())
            }
        };

        // Stop stats task on shutdown
        if let Some(handle) = stats_handle {
            handle.abort();
        }

        result?;
        tracing::info!(addr = %addr, "MJPEG server stopped");
        Ok(())
    }

    fn state(&self) -> AppState {
        AppState {
            buffer: self.buffer.clone(),
            page: self.page.clone(),
            config: Arc::clone(&self.config),
            next_session_id: Arc::clone(&self.next_session_id),
            connection_semaphore: self.connection_semaphore.clone(),
            cancel: self.cancel.clone(),
        }
    }

    fn spawn_stats_task(&self) -> Option<JoinHandle<()>> {
        let interval = self.config.stats_interval;
        if interval.is_zero() {
            return None;
        }

        let metrics = Arc::clone(self.buffer.metrics());

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let stats = metrics.snapshot();
                tracing::info!(
                    frames_published = stats.frames_published,
                    framerate = %format!("{:.1}", stats.framerate()),
                    bitrate = stats.bitrate(),
                    clients = stats.active_connections,
                    total_clients = stats.total_connections,
                    failed_clients = stats.failed_connections,
                    frames_sent = stats.frames_sent,
                    frames_skipped = stats.frames_skipped,
                    "Stream stats"
                );
            }
        }))
    }
}
