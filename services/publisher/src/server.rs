use crate::state::VideoState;
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub video: VideoState,
    pub index_file: Arc<PathBuf>,
    pub service_name: Arc<str>,
}

/// Current video URL response
#[derive(Debug, Serialize)]
pub struct VideoUrlResponse {
    pub url: String,
}

/// Create the HTTP router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/video.mp4", get(current_video))
        .route("/api/video-url", get(video_url))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Landing page
async fn index(State(state): State<AppState>, request: Request) -> Response {
    serve_file(state.index_file.as_path().to_path_buf(), request).await
}

/// Local copy of the currently published video
async fn current_video(State(state): State<AppState>, request: Request) -> Response {
    match state.video.local_file() {
        Some(path) => serve_file(path, request).await,
        None => (StatusCode::NOT_FOUND, "Video not yet published").into_response(),
    }
}

/// Public URL of the current video
async fn video_url(State(state): State<AppState>) -> Json<VideoUrlResponse> {
    Json(VideoUrlResponse {
        url: state.video.public_url(),
    })
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": &*state.service_name,
    }))
}

/// Serve a local file with range and content-type handling
async fn serve_file(path: PathBuf, request: Request) -> Response {
    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}

/// Bind the HTTP listener. Failing here is fatal to the process.
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to address {addr}"))?;
    info!(address = %addr, "HTTP listener bound");
    Ok(listener)
}

/// Serve until `shutdown` is cancelled, then give in-flight requests up to
/// `grace` to finish.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
    grace: Duration,
) -> Result<()> {
    let mut server = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
        }
    });

    tokio::select! {
        joined = &mut server => {
            return joined.context("HTTP server task panicked")?.context("HTTP server error");
        }
        _ = shutdown.cancelled() => {}
    }

    match tokio::time::timeout(grace, &mut server).await {
        Ok(joined) => {
            joined
                .context("HTTP server task panicked")?
                .context("HTTP server error")?;
            info!("HTTP server drained");
        }
        Err(_) => {
            warn!(grace_secs = grace.as_secs(), "Grace period elapsed, dropping open connections");
            server.abort();
        }
    }

    Ok(())
}
