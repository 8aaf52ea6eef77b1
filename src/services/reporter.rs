use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::queue::{CurrentJob, JobQueue, QueueStats};
use crate::models::job::{Job, JobFilter, JobStatus};

/// One failed image, as shown to dashboards.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageFailure {
    pub index: usize,
    pub error: String,
    /// Never attempted; the job stopped before reaching it.
    pub skipped: bool,
}

/// Progress view of a single job.
#[derive(Debug, Clone, Serialize)]
pub struct JobDetail {
    pub id: Uuid,
    pub config_name: String,
    pub status: JobStatus,
    pub total_images: usize,
    pub completed_images: usize,
    pub failed_images: usize,
    pub skipped_images: usize,
    pub current_image_index: usize,
    pub retry_count: u32,
    pub progress: f64,
    pub cancel_requested: bool,
    pub error: Option<String>,
    pub failures: Vec<ImageFailure>,
    pub image_refs: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&Job> for JobDetail {
    fn from(job: &Job) -> Self {
        let failures = job
            .results
            .iter()
            .filter(|r| !r.success)
            .map(|r| ImageFailure {
                index: r.index,
                error: r.error.clone().unwrap_or_default(),
                skipped: r.skipped,
            })
            .collect();
        let image_refs = job
            .results
            .iter()
            .filter_map(|r| r.image_ref.clone())
            .collect();

        Self {
            id: job.id,
            config_name: job.config_name.clone(),
            status: job.status,
            total_images: job.total_images,
            completed_images: job.completed_images,
            failed_images: job.failed_images,
            skipped_images: job.skipped_images(),
            current_image_index: job.current_image_index,
            retry_count: job.retry_count,
            progress: job.progress(),
            cancel_requested: job.cancel_requested,
            error: job.error.clone(),
            failures,
            image_refs,
            created_at: job.created_at,
            updated_at: job.updated_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}

/// Row of a job listing.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub config_name: String,
    pub status: JobStatus,
    pub total_images: usize,
    pub completed_images: usize,
    pub failed_images: usize,
    pub progress: f64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            config_name: job.config_name.clone(),
            status: job.status,
            total_images: job.total_images,
            completed_images: job.completed_images,
            failed_images: job.failed_images,
            progress: job.progress(),
            error: job.error.clone(),
            created_at: job.created_at,
            finished_at: job.finished_at,
        }
    }
}

/// Read-only views over the queue for dashboards and the HTTP API.
///
/// Every call works from a snapshot taken under the queue lock and released
/// before any formatting, so polling never holds up the runner.
#[derive(Clone)]
pub struct StatusReporter {
    queue: Arc<JobQueue>,
}

impl StatusReporter {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        Self { queue }
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.get_queue_stats()
    }

    pub fn job_detail(&self, id: Uuid) -> Option<JobDetail> {
        self.queue.get_job(id).as_ref().map(JobDetail::from)
    }

    /// The job the runner is working on, if any.
    pub fn current_job(&self) -> Option<CurrentJob> {
        self.queue.get_queue_stats().current_job
    }

    pub fn list(&self, filter: &JobFilter) -> Vec<JobSummary> {
        self.queue
            .list_jobs(filter)
            .iter()
            .map(JobSummary::from)
            .collect()
    }
}
