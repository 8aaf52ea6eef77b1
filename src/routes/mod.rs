pub mod error;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod preview;

use axum::response::Html;
use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

/// Dashboard page, API routes and health check. `/metrics` and the HTTP layers
/// are added by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { Html(include_str!("../../static/index.html")) }))
        .route("/health", get(health::health_check))
        .route("/api/v1/jobs", post(jobs::add_job).get(jobs::list_jobs))
        .route("/api/v1/jobs/prompts", post(jobs::add_job_with_prompts))
        .route(
            "/api/v1/jobs/{job_id}",
            get(jobs::get_job).delete(jobs::remove_job),
        )
        .route("/api/v1/jobs/{job_id}/progress", get(jobs::get_job_progress))
        .route("/api/v1/jobs/{job_id}/cancel", post(jobs::cancel_job))
        .route("/api/v1/jobs/{job_id}/retry", post(jobs::retry_job))
        .route("/api/v1/queue/stats", get(jobs::queue_stats))
        .route("/api/v1/queue/clear", post(jobs::clear_finished))
        .route("/api/v1/preview", post(preview::preview_prompts))
        .route("/api/v1/configs", get(preview::list_configs))
        .route("/api/v1/wildcards", get(preview::list_wildcards))
        .route("/api/v1/wildcards/reset", post(preview::reset_wildcard))
        .with_state(state)
}
