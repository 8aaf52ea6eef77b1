//! Test helper utilities for E2E testing against a running server

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

/// Response from POST /api/v1/jobs and /api/v1/jobs/prompts
#[derive(Debug, Serialize, Deserialize)]
pub struct AddJobResponse {
    pub job_id: Uuid,
    pub status: String,
    pub total_images: usize,
}

/// Response from GET /api/v1/jobs/{job_id}/progress
#[derive(Debug, Serialize, Deserialize)]
pub struct JobProgress {
    pub id: Uuid,
    pub status: String,
    pub total_images: usize,
    pub completed_images: usize,
    pub failed_images: usize,
    pub skipped_images: usize,
    pub error: Option<String>,
    pub image_refs: Vec<String>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Response from POST /api/v1/preview
#[derive(Debug, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub template: String,
    pub wildcards: Vec<String>,
    pub prompts: Vec<String>,
}

async fn expect_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, Box<dyn std::error::Error>> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await?;
        return Err(format!("Request failed with status {}: {}", status, error_text).into());
    }
    Ok(response.json::<T>().await?)
}

/// Queue a template-driven job
pub async fn submit_job(
    client: &reqwest::Client,
    base_url: &str,
    config_name: &str,
    batch_size: u32,
    num_batches: u32,
) -> Result<AddJobResponse, Box<dyn std::error::Error>> {
    let response = client
        .post(format!("{}/api/v1/jobs", base_url))
        .json(&serde_json::json!({
            "config_name": config_name,
            "batch_size": batch_size,
            "num_batches": num_batches,
        }))
        .send()
        .await?;
    expect_json(response).await
}

/// Queue a job with explicit prompts
pub async fn submit_prompts(
    client: &reqwest::Client,
    base_url: &str,
    config_name: &str,
    prompts: &[String],
) -> Result<AddJobResponse, Box<dyn std::error::Error>> {
    let response = client
        .post(format!("{}/api/v1/jobs/prompts", base_url))
        .json(&serde_json::json!({
            "config_name": config_name,
            "prompts": prompts,
        }))
        .send()
        .await?;
    expect_json(response).await
}

/// Preview prompts for a config
pub async fn preview(
    client: &reqwest::Client,
    base_url: &str,
    config_name: &str,
    count: usize,
) -> Result<PreviewResponse, Box<dyn std::error::Error>> {
    let response = client
        .post(format!("{}/api/v1/preview", base_url))
        .json(&serde_json::json!({"config_name": config_name, "count": count}))
        .send()
        .await?;
    expect_json(response).await
}

/// Request cancellation of a job
pub async fn cancel_job(
    client: &reqwest::Client,
    base_url: &str,
    job_id: Uuid,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let response = client
        .post(format!("{}/api/v1/jobs/{}/cancel", base_url, job_id))
        .send()
        .await?;
    expect_json(response).await
}

/// Poll job progress until it reaches a terminal status (with timeout)
pub async fn poll_job_progress(
    client: &reqwest::Client,
    base_url: &str,
    job_id: Uuid,
    timeout_secs: u64,
) -> Result<JobProgress, Box<dyn std::error::Error>> {
    let max_attempts = timeout_secs * 2; // Poll every 500ms

    for attempt in 0..max_attempts {
        let response = client
            .get(format!("{}/api/v1/jobs/{}/progress", base_url, job_id))
            .send()
            .await?;
        let progress: JobProgress = expect_json(response).await?;

        match progress.status.as_str() {
            "completed" | "failed" | "cancelled" => return Ok(progress),
            "pending" | "running" | "retrying" => {
                if attempt % 10 == 0 && attempt > 0 {
                    println!(
                        "  ... {} {}/{} (attempt {}/{})",
                        progress.status,
                        progress.completed_images,
                        progress.total_images,
                        attempt,
                        max_attempts
                    );
                }
                sleep(Duration::from_millis(500)).await;
            }
            _ => {
                return Err(format!("Unknown job status: {}", progress.status).into());
            }
        }
    }

    Err(format!("Job did not finish within {} seconds", timeout_secs).into())
}

/// Wait for the server's runner to finish a job
pub async fn wait_for_job(
    client: &reqwest::Client,
    base_url: &str,
    job_id: Uuid,
) -> Result<JobProgress, Box<dyn std::error::Error>> {
    poll_job_progress(client, base_url, job_id, 600).await
}

/// Assert the counters of a finished job account for every image
pub fn assert_job_accounted(progress: &JobProgress) {
    assert_eq!(
        progress.completed_images + progress.failed_images,
        progress.total_images,
        "Counters do not cover all images of job {}",
        progress.id
    );
    assert_eq!(
        progress.image_refs.len(),
        progress.completed_images,
        "Every completed image needs a stored file"
    );
    println!(
        "  ✓ {} - {}: {}/{} completed, {} failed",
        progress.id,
        progress.status,
        progress.completed_images,
        progress.total_images,
        progress.failed_images
    );
}
