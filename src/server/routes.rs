//! HTTP routes
//!
//! - `GET /` redirects to `/index.html`
//! - `GET /index.html` serves the landing page
//! - `GET /stream.mjpg` streams frames as `multipart/x-mixed-replace`
//! - anything else is 404

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::sync::Semaphore;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use super::config::ServerConfig;
use super::page::IndexPage;
use crate::frame::FrameBuffer;
use crate::stream::{multipart, StreamBroadcaster};

/// State shared by every request handler
#[derive(Clone)]
pub(crate) struct AppState {
    pub buffer: FrameBuffer,
    pub page: IndexPage,
    pub config: Arc<ServerConfig>,
    pub next_session_id: Arc<AtomicU64>,
    pub connection_semaphore: Option<Arc<Semaphore>>,
    pub cancel: CancellationToken,
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(redirect_to_index))
        .route("/index.html", get(index))
        .route("/stream.mjpg", get(stream))
        .fallback(not_found)
        .with_state(state)
}

async fn redirect_to_index() -> Response {
    (
        StatusCode::MOVED_PERMANENTLY,
        [(header::LOCATION, "/index.html")],
    )
        .into_response()
}

async fn index(State(state): State<AppState>) -> Response {
    let content = state.page.content().clone();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html")],
        [(header::CONTENT_LENGTH, content.len().to_string())],
        content,
    )
        .into_response()
}

async fn stream(
    State(state): State<AppState>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
) -> Response {
    // Check connection limit
    let permit = match state.connection_semaphore {
        Some(ref sem) => match Arc::clone(sem).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(peer = %peer_addr, "Stream client rejected: limit reached");
                return (StatusCode::SERVICE_UNAVAILABLE, "Too many stream clients").into_response();
            }
        },
        None => None,
    };

    let session_id = state.next_session_id.fetch_add(1, Ordering::Relaxed);

    tracing::info!(
        session_id = session_id,
        peer = %peer_addr,
        "New stream client"
    );

    // The broadcaster writes into one end; the response body drains the other.
    // When the client goes away the body is dropped and the next write fails.
    let (output, body) = tokio::io::duplex(state.config.write_buffer_size);

    let mut broadcaster =
        StreamBroadcaster::new(session_id, peer_addr, output, state.buffer.clone())
            .with_cancellation(state.cancel.child_token());
    if !state.config.idle_timeout.is_zero() {
        broadcaster = broadcaster.idle_timeout(state.config.idle_timeout);
    }
    if !state.config.write_timeout.is_zero() {
        broadcaster = broadcaster.write_timeout(state.config.write_timeout);
    }

    tokio::spawn(async move {
        let _permit = permit;

        match broadcaster.run().await {
            Ok(()) => {
                tracing::info!(session_id = session_id, peer = %peer_addr, "Stream client finished");
            }
            Err(e) => {
                tracing::warn!(
                    session_id = session_id,
                    peer = %peer_addr,
                    error = %e,
                    "Removed streaming client"
                );
            }
        }
    });

    (
        StatusCode::OK,
        [
            (header::AGE, "0"),
            (header::CACHE_CONTROL, "no-cache, private"),
            (header::PRAGMA, "no-cache"),
            (header::CONTENT_TYPE, multipart::CONTENT_TYPE),
        ],
        Body::from_stream(ReaderStream::new(body)),
    )
        .into_response()
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}
