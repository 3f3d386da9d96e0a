// crates/server/src/routes/jobs.rs
//! API routes for background-job management.
//!
//! - POST   /background-jobs — Submit an analytical job
//! - GET    /background-jobs — List the caller's jobs
//! - GET    /background-jobs/{id}/status — Status, progress, retry state
//! - DELETE /background-jobs/{id} — Cancel a queued or running job
//! - GET    /background-jobs/stream — SSE stream of the caller's job events
//!
//! Caller identity comes from the `x-user-id` header; verifying it is the
//! identity provider's job, upstream of this service.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

use quotient_core::{BackendKind, Job, JobStatus, JobType};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::tracker::CancelOutcome;

// ============================================================================
// Request / Response Types
// ============================================================================

/// Request body for POST /api/background-jobs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    /// One of the closed job-type enumeration, e.g. "financial_forecasting".
    pub job_type: String,
    /// Job-type-specific payload; validated against the type's required shape.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Response for POST /api/background-jobs (201 Created).
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub job_id: String,
}

/// Response for DELETE /api/background-jobs/{id}.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct CancelJobResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// Job view returned by the status and list endpoints.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub progress_percentage: i64,
    pub retry_count: i64,
    pub max_retries: i64,
    pub priority: i64,
    pub backend_kind: BackendKind,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<i64>,
    /// Present only for jobs currently in `failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Present only for completed jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        // error_message survives a requeue for observability; the API only
        // surfaces it while the job actually is failed.
        let error_message = (job.status == JobStatus::Failed)
            .then_some(job.error_message)
            .flatten();
        let result = (job.status == JobStatus::Completed)
            .then_some(job.result)
            .flatten();
        Self {
            job_id: job.id,
            job_type: job.job_type,
            status: job.status,
            progress_percentage: job.progress_percentage,
            retry_count: job.retry_count,
            max_retries: job.max_retries,
            priority: job.priority,
            backend_kind: job.backend_kind,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            failed_at: job.failed_at,
            cancelled_at: job.cancelled_at,
            error_message,
            result,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Extract the caller's user id from the `x-user-id` header.
fn owner_id(headers: &HeaderMap) -> ApiResult<String> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest("missing x-user-id header".to_string()))
}

/// POST /api/background-jobs — Admit a new job.
async fn submit_job(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SubmitJobRequest>,
) -> ApiResult<impl IntoResponse> {
    let owner = owner_id(&headers)?;
    let job_type = JobType::from_db_str(&request.job_type).ok_or_else(|| {
        ApiError::from(quotient_core::OrchestrationError::Validation(format!(
            "unknown job type '{}'",
            request.job_type
        )))
    })?;

    let job = state
        .admission
        .submit(&owner, job_type, request.params)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitJobResponse { job_id: job.id }),
    ))
}

/// GET /api/background-jobs — List the caller's jobs.
async fn list_jobs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<JobStatusResponse>>> {
    let owner = owner_id(&headers)?;
    let jobs = state.db.list_jobs_for_owner(&owner).await?;
    Ok(Json(jobs.into_iter().map(JobStatusResponse::from).collect()))
}

/// GET /api/background-jobs/{id}/status — Status for one of the caller's jobs.
async fn job_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let owner = owner_id(&headers)?;
    let job = state
        .db
        .get_job_for_owner(&id, &owner)
        .await?
        .ok_or(ApiError::JobNotFound(id))?;
    Ok(Json(job.into()))
}

/// DELETE /api/background-jobs/{id} — Cancel a queued or running job.
async fn cancel_job(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<CancelJobResponse>> {
    let owner = owner_id(&headers)?;
    // Ownership check first so other users' job ids stay indistinguishable
    // from missing ones.
    if state.db.get_job_for_owner(&id, &owner).await?.is_none() {
        return Err(ApiError::JobNotFound(id));
    }

    match state.tracker.cancel(&id, &owner).await? {
        CancelOutcome::Cancelled(job) => Ok(Json(CancelJobResponse {
            job_id: job.id,
            status: job.status,
        })),
        CancelOutcome::AlreadyTerminal(status) => Err(ApiError::Conflict(format!(
            "job is already {status}"
        ))),
        CancelOutcome::NotFound => Err(ApiError::JobNotFound(id)),
    }
}

/// GET /api/background-jobs/stream — SSE stream of the caller's job events.
async fn stream_jobs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>> {
    let owner = owner_id(&headers)?;
    let rx = state.tracker.subscribe();

    let stream = async_stream::stream! {
        let mut rx = rx;
        while let Ok(event) = rx.recv().await {
            if event.owner_id != owner {
                continue;
            }
            let json = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().data(json));
        }
    };

    Ok(Sse::new(stream))
}

/// Build the background-jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/background-jobs", post(submit_job))
        .route("/background-jobs", get(list_jobs))
        .route("/background-jobs/stream", get(stream_jobs))
        .route("/background-jobs/{id}/status", get(job_status))
        .route("/background-jobs/{id}", delete(cancel_job))
}
