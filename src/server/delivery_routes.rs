//! Album delivery HTTP routes.
//!
//! Provides endpoints for:
//! - Starting a delivery job for an album
//! - Polling job status (lenient id matching)
//! - Fetching, extracting, and auto-delete management of artifacts

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::delivery::DeliveryError;
use crate::server::state::{GuardedDeliveryEngine, ServerState};

/// Machine-readable error body: a stable kind plus a human string.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

fn error_response(err: DeliveryError) -> Response {
    let status = err.status_code();
    if status.is_server_error() {
        warn!("Delivery request failed: {}", err);
    } else {
        debug!("Delivery request rejected: {}", err);
    }
    (
        status,
        Json(ErrorBody {
            error: err.kind(),
            message: err.to_string(),
        }),
    )
        .into_response()
}

/// POST /albums/{album_id} - Start a delivery job
async fn start_delivery(
    State(engine): State<GuardedDeliveryEngine>,
    Path(album_id): Path<i64>,
) -> Response {
    match engine.start_delivery(album_id) {
        Ok(started) => Json(started).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /jobs - Snapshot of all live job rows
async fn list_jobs(State(engine): State<GuardedDeliveryEngine>) -> Response {
    Json(engine.active_jobs()).into_response()
}

/// GET /jobs/{job_id} - Job row plus derived poller fields
async fn job_status(
    State(engine): State<GuardedDeliveryEngine>,
    Path(job_id): Path<String>,
) -> Response {
    match engine.job_status(&job_id) {
        Ok(view) => Json(view).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /jobs/{job_id}/archive - Stream the artifact
///
/// The first successful fetch schedules the timed artifact deletion.
async fn fetch_archive(
    State(engine): State<GuardedDeliveryEngine>,
    Path(job_id): Path<String>,
) -> Response {
    let artifact = match engine.prepare_fetch(&job_id) {
        Ok(a) => a,
        Err(e) => return error_response(e),
    };

    let file = match tokio::fs::File::open(&artifact.path).await {
        Ok(f) => f,
        Err(_) => return error_response(DeliveryError::ArtifactMissing(artifact.path)),
    };

    debug!("Streaming artifact {}", artifact.path.display());
    let stream = ReaderStream::new(file);
    let disposition = format!(
        "attachment; filename=\"{}\"",
        artifact.download_name.replace('"', "_")
    );
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// POST /jobs/{job_id}/extract - Unpack the archive server-side
///
/// Extraction is blocking zip work, so it runs off the async pool.
async fn extract_archive(
    State(engine): State<GuardedDeliveryEngine>,
    Path(job_id): Path<String>,
) -> Response {
    let result = tokio::task::spawn_blocking(move || engine.extract(&job_id)).await;
    match result {
        Ok(Ok(summary)) => Json(summary).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(e) => {
            warn!("Extraction task panicked: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// POST /jobs/{job_id}/cancel-deletion - Drop the pending timed deletion
async fn cancel_deletion(
    State(engine): State<GuardedDeliveryEngine>,
    Path(job_id): Path<String>,
) -> Response {
    match engine.cancel_scheduled_deletion(&job_id) {
        Ok(cancelled) => Json(cancelled).into_response(),
        Err(e) => error_response(e),
    }
}

/// Build the delivery routes.
///
/// - POST /albums/{album_id}
/// - GET  /jobs
/// - GET  /jobs/{job_id}
/// - GET  /jobs/{job_id}/archive
/// - POST /jobs/{job_id}/extract
/// - POST /jobs/{job_id}/cancel-deletion
pub fn delivery_routes() -> Router<ServerState> {
    Router::new()
        .route("/albums/{album_id}", post(start_delivery))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{job_id}", get(job_status))
        .route("/jobs/{job_id}/archive", get(fetch_archive))
        .route("/jobs/{job_id}/extract", post(extract_archive))
        .route("/jobs/{job_id}/cancel-deletion", post(cancel_deletion))
}
