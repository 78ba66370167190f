//! Defines the Axum API routes and handlers.

use crate::scheduler::{QueueError, QueueStatus};
use crate::web::models::{
    EnqueueRequest, EnqueueResponse, ErrorResponse, JobsQuery, JobsResponse, PrintersResponse,
    QueueControlResponse,
};
use crate::web::queue_channel::QueueRequest;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tokio::sync::{mpsc::Sender, oneshot};

pub type AppState = Sender<QueueRequest>;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Creates the Axum router with all the API endpoints.
pub fn create_router(queue_tx: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/queue/start", post(start_queue))
        .route("/api/v1/queue/stop", post(stop_queue))
        .route("/api/v1/jobs", get(list_jobs).post(enqueue_job))
        .route("/api/v1/printers", get(list_printers))
        .with_state(queue_tx)
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn queue_error(e: QueueError) -> ApiError {
    let status = match e {
        QueueError::InvalidCopies => StatusCode::BAD_REQUEST,
        QueueError::Printer(_) => StatusCode::BAD_GATEWAY,
        QueueError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_error(status, e.to_string())
}

/// Send one request to the queue task and wait for its reply.
async fn ask<T>(
    queue_tx: &AppState,
    build: impl FnOnce(oneshot::Sender<T>) -> QueueRequest,
) -> Result<T, ApiError> {
    let (resp_tx, resp_rx) = oneshot::channel();
    if queue_tx.send(build(resp_tx)).await.is_err() {
        return Err(json_error(StatusCode::SERVICE_UNAVAILABLE, "print queue task is not running"));
    }
    resp_rx
        .await
        .map_err(|_| json_error(StatusCode::INTERNAL_SERVER_ERROR, "print queue task dropped the request"))
}

async fn get_status(State(queue_tx): State<AppState>) -> Result<Json<QueueStatus>, ApiError> {
    let status = ask(&queue_tx, |respond_to| QueueRequest::GetStatus { respond_to }).await?;
    status.map(Json).map_err(queue_error)
}

async fn start_queue(State(queue_tx): State<AppState>) -> Result<Json<QueueControlResponse>, ApiError> {
    let changed = ask(&queue_tx, |respond_to| QueueRequest::Start { respond_to }).await?;
    Ok(Json(QueueControlResponse { running: true, changed }))
}

async fn stop_queue(State(queue_tx): State<AppState>) -> Result<Json<QueueControlResponse>, ApiError> {
    let changed = ask(&queue_tx, |respond_to| QueueRequest::Stop { respond_to }).await?;
    Ok(Json(QueueControlResponse { running: false, changed }))
}

async fn list_jobs(
    State(queue_tx): State<AppState>,
    Query(query): Query<JobsQuery>,
) -> Result<Json<JobsResponse>, ApiError> {
    let jobs = ask(&queue_tx, |respond_to| QueueRequest::ListJobs {
        status: query.status,
        respond_to,
    })
    .await?
    .map_err(queue_error)?;
    Ok(Json(JobsResponse { jobs }))
}

async fn enqueue_job(
    State(queue_tx): State<AppState>,
    Json(payload): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<EnqueueResponse>), ApiError> {
    if payload.file_path.trim().is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "file_path must not be empty"));
    }
    let jobs = ask(&queue_tx, |respond_to| QueueRequest::Enqueue {
        request: payload,
        respond_to,
    })
    .await?
    .map_err(queue_error)?;
    Ok((StatusCode::CREATED, Json(EnqueueResponse { jobs })))
}

async fn list_printers(State(queue_tx): State<AppState>) -> Result<Json<PrintersResponse>, ApiError> {
    let printers = ask(&queue_tx, |respond_to| QueueRequest::ListPrinters { respond_to })
        .await?
        .map_err(queue_error)?;
    Ok(Json(PrintersResponse { printers }))
}
