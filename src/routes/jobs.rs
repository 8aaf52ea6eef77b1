use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use crate::app_state::AppState;
use crate::models::api::{
    AddJobRequest, AddJobResponse, AddJobWithPromptsRequest, CancelResponse, ClearResponse,
};
use crate::models::job::{Job, JobFilter};
use crate::services::queue::QueueStats;
use crate::services::reporter::{JobDetail, JobSummary};

/// POST /api/v1/jobs — queue a batch resolved lazily from the config's template.
pub async fn add_job(
    State(state): State<AppState>,
    Json(req): Json<AddJobRequest>,
) -> ApiResult<(StatusCode, Json<AddJobResponse>)> {
    req.validate()?;
    let config = state.configs.load(&req.config_name)?;

    // Catch missing wildcards now rather than when the runner reaches the job.
    for name in state.resolver.placeholders(&config.prompt.positive) {
        state.wildcards.values(&name)?;
    }

    let job = state
        .queue
        .add_job(&config, req.batch_size, req.num_batches, req.seed)?;
    Ok((StatusCode::CREATED, Json(accepted(&job))))
}

/// POST /api/v1/jobs/prompts — queue a batch with prompts resolved up front.
pub async fn add_job_with_prompts(
    State(state): State<AppState>,
    Json(req): Json<AddJobWithPromptsRequest>,
) -> ApiResult<(StatusCode, Json<AddJobResponse>)> {
    req.validate()?;
    let config = state.configs.load(&req.config_name)?;

    // Previewed prompts: advance the rotation past the values they used.
    if let Some(template) = &req.template {
        let committed = state.resolver.resolve(template, req.prompts.len())?;
        if committed != req.prompts {
            tracing::warn!(
                config = %req.config_name,
                "Submitted prompts differ from the template's current rotation"
            );
        }
    }

    let job = state.queue.add_job_with_prompts(&config, req.prompts, req.seed)?;
    Ok((StatusCode::CREATED, Json(accepted(&job))))
}

/// GET /api/v1/jobs?status=&config_name=
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(filter): Query<JobFilter>,
) -> Json<Vec<JobSummary>> {
    Json(state.reporter.list(&filter))
}

/// GET /api/v1/jobs/{job_id} — the full job record.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Job>> {
    state
        .queue
        .get_job(job_id)
        .map(Json)
        .ok_or(ApiError::JobNotFound(job_id))
}

/// GET /api/v1/jobs/{job_id}/progress
pub async fn get_job_progress(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobDetail>> {
    state
        .reporter
        .job_detail(job_id)
        .map(Json)
        .ok_or(ApiError::JobNotFound(job_id))
}

/// POST /api/v1/jobs/{job_id}/cancel
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<CancelResponse>> {
    let outcome = state.queue.request_cancel(job_id)?;
    Ok(Json(CancelResponse { job_id, outcome }))
}

/// POST /api/v1/jobs/{job_id}/retry
pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<AddJobResponse>> {
    let job = state.queue.retry_job(job_id)?;
    Ok(Json(accepted(&job)))
}

/// DELETE /api/v1/jobs/{job_id}
pub async fn remove_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.queue.remove_job(job_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/queue/stats
pub async fn queue_stats(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.reporter.queue_stats())
}

/// POST /api/v1/queue/clear — drop every finished job.
pub async fn clear_finished(State(state): State<AppState>) -> ApiResult<Json<ClearResponse>> {
    let removed = state.queue.clear_finished()?;
    Ok(Json(ClearResponse { removed }))
}

fn accepted(job: &Job) -> AddJobResponse {
    AddJobResponse {
        job_id: job.id,
        status: job.status,
        total_images: job.total_images,
    }
}
