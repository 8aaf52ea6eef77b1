use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::JobStatus;
use crate::services::queue::CancelOutcome;

/// Request to queue a template-driven batch.
#[derive(Debug, Deserialize, Validate)]
pub struct AddJobRequest {
    #[garde(length(min = 1, max = 200))]
    pub config_name: String,

    #[garde(range(min = 1, max = 64))]
    #[serde(default = "default_one")]
    pub batch_size: u32,

    #[garde(range(min = 1, max = 1000))]
    #[serde(default = "default_one")]
    pub num_batches: u32,

    #[garde(range(min = 0, max = 4_294_967_295))]
    pub seed: Option<i64>,
}

/// Request to queue a batch with prompts already resolved.
#[derive(Debug, Deserialize, Validate)]
pub struct AddJobWithPromptsRequest {
    #[garde(length(min = 1, max = 200))]
    pub config_name: String,

    #[garde(length(min = 1, max = 1000), inner(length(min = 1, max = 10_000)))]
    pub prompts: Vec<String>,

    /// Template the prompts were previewed from. When set, submitting uses up
    /// the same wildcard values a run of the template would.
    #[garde(length(min = 1, max = 10_000))]
    #[serde(default)]
    pub template: Option<String>,

    #[garde(range(min = 0, max = 4_294_967_295))]
    pub seed: Option<i64>,
}

/// Request to preview prompts without consuming wildcard rotation.
///
/// Exactly one of `config_name` and `template` should be set; `template` wins
/// when both are.
#[derive(Debug, Deserialize, Validate)]
pub struct PreviewRequest {
    #[garde(length(min = 1, max = 200))]
    pub config_name: Option<String>,

    #[garde(length(min = 1, max = 10_000))]
    pub template: Option<String>,

    #[garde(range(min = 1, max = 100))]
    #[serde(default = "default_one_usize")]
    pub count: usize,
}

/// Request to restart a wildcard's rotation with a fresh shuffle.
#[derive(Debug, Deserialize, Validate)]
pub struct ResetWildcardRequest {
    #[garde(length(min = 1, max = 200))]
    pub name: String,
}

fn default_one() -> u32 {
    1
}

fn default_one_usize() -> usize {
    1
}

/// Response after queueing a job.
#[derive(Debug, Serialize, Deserialize)]
pub struct AddJobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub total_images: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub template: String,
    pub wildcards: Vec<String>,
    pub prompts: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub removed: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub job_id: Uuid,
    pub outcome: CancelOutcome,
}
