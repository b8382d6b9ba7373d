//! HTTP surface.
//!
//! Three POST endpoints under [`ROUTE_PREFIX`] drive the export session; each request maps to
//! exactly one session call and each session call's single result becomes exactly one response.

mod upload;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::foundation::error::ExportError;
use crate::session::{EndRequest, ExportReply, ExportSession, StartRequest};

/// Path prefix the browser client posts to.
pub const ROUTE_PREFIX: &str = "/canvas-sketch-cli";

/// Build the application router.
pub fn router(session: Arc<ExportSession>) -> Router {
    let body_limit = session.config().max_upload_bytes;
    Router::new()
        .route(&format!("{ROUTE_PREFIX}/saveBlob"), post(save_blob))
        .route(&format!("{ROUTE_PREFIX}/stream-start"), post(stream_start))
        .route(&format!("{ROUTE_PREFIX}/stream-end"), post(stream_end))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(session)
}

/// Error body: `{"error": "<message>"}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn from_export(op: &'static str, err: ExportError, status: Option<StatusCode>) -> Self {
        let status = status.unwrap_or_else(|| {
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        });
        tracing::error!(op, status = status.as_u16(), "{err}");
        Self {
            status,
            message: err.to_string(),
        }
    }

    fn bad_body(op: &'static str, rejection: JsonRejection) -> Self {
        Self::from_export(
            op,
            ExportError::validation(rejection.body_text()),
            Some(StatusCode::BAD_REQUEST),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

type ApiResult = Result<Json<ExportReply>, ApiError>;

async fn stream_start(
    State(session): State<Arc<ExportSession>>,
    body: Result<Json<StartRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = body.map_err(|r| ApiError::bad_body("stream-start", r))?;
    session
        .start(req)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_export("stream-start", e, None))
}

async fn stream_end(
    State(session): State<Arc<ExportSession>>,
    body: Result<Json<EndRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = body.map_err(|r| ApiError::bad_body("stream-end", r))?;
    session
        .end(req)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_export("stream-end", e, None))
}

async fn save_blob(State(session): State<Arc<ExportSession>>, multipart: Multipart) -> ApiResult {
    upload::ingest_multipart(&session, multipart)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_export("saveBlob", e, Some(StatusCode::INTERNAL_SERVER_ERROR)))
}

async fn health(State(session): State<Arc<ExportSession>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "session": session.status(),
    }))
}

/// Serve until Ctrl-C/SIGTERM, then finalize any open stream.
pub async fn serve(session: Arc<ExportSession>, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    let local = listener.local_addr().context("read bound address")?;

    info!("export server listening on http://{local}");
    match session.config().output.as_deref() {
        Some(dir) => info!("   output: {}", dir.display()),
        None => info!("   output: disabled"),
    }
    match session.config().stream.as_ref() {
        Some(stream) => info!("   stream: {} (buffered: {})", stream.format, stream.buffer),
        None => info!("   stream: disabled"),
    }

    axum::serve(listener, router(Arc::clone(&session)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    session.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let terminate = async {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!("failed to install SIGTERM handler: {e}");
                    std::future::pending::<()>().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
