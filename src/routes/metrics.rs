use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Describe the generation metrics so the exporter emits HELP lines.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "generation_jobs_submitted_total",
        "Total generation jobs queued"
    );
    metrics::describe_counter!(
        "generation_images_completed_total",
        "Images generated and stored successfully"
    );
    metrics::describe_counter!(
        "generation_images_failed_total",
        "Images that failed permanently or exhausted their retries"
    );
    metrics::describe_counter!(
        "generation_retries_total",
        "Retries after transient generation failures"
    );
    metrics::describe_histogram!(
        "generation_request_seconds",
        "Duration of remote txt2img calls"
    );
    metrics::describe_gauge!("generation_queue_pending", "Jobs waiting in the queue");
}

/// Prometheus metrics scrape endpoint.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
