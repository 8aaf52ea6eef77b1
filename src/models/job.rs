use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Status of a generation job in the queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Retrying,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Claimed by the runner (running or between retry attempts).
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Retrying)
    }
}

/// Where the prompts for a job's images come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PromptSource {
    /// Prompts resolved up front (e.g. from a dashboard preview), one per image.
    Fixed { prompts: Vec<String> },
    /// Prompts resolved lazily from a template, one per image, as the job runs.
    Templated {
        template: String,
        wildcards: Vec<String>,
    },
}

/// Outcome of one image task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageResult {
    pub index: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub image_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    /// Number of remote calls made for this image.
    pub attempts: u32,
    /// Never attempted: the job was cancelled or failed as a whole first.
    #[serde(default)]
    pub skipped: bool,
    pub created_at: DateTime<Utc>,
}

impl ImageResult {
    pub fn success(
        index: usize,
        prompt: String,
        seed: i64,
        image_ref: String,
        metadata: serde_json::Value,
        attempts: u32,
    ) -> Self {
        Self {
            index,
            success: true,
            prompt: Some(prompt),
            seed: Some(seed),
            image_ref: Some(image_ref),
            metadata: Some(metadata),
            error: None,
            attempts,
            skipped: false,
            created_at: Utc::now(),
        }
    }

    pub fn failure(index: usize, prompt: Option<String>, seed: Option<i64>, error: String, attempts: u32) -> Self {
        Self {
            index,
            success: false,
            prompt,
            seed,
            image_ref: None,
            metadata: None,
            error: Some(error),
            attempts,
            skipped: false,
            created_at: Utc::now(),
        }
    }

    pub fn skipped(index: usize, reason: &str) -> Self {
        Self {
            skipped: true,
            ..Self::failure(index, None, None, reason.to_string(), 0)
        }
    }
}

/// A queued batch generation request, decomposed into `total_images` image tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub config_name: String,
    pub status: JobStatus,
    pub batch_size: u32,
    pub num_batches: u32,
    pub total_images: usize,
    pub prompt_source: PromptSource,
    /// Explicit base seed; image `i` uses `seed + i`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub seed: Option<i64>,
    pub completed_images: usize,
    pub failed_images: usize,
    pub current_image_index: usize,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    pub retry_count: u32,
    #[serde(default)]
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Outcomes ordered by image index.
    pub results: Vec<ImageResult>,
}

impl Job {
    /// A template-driven job of `batch_size * num_batches` images.
    pub fn templated(
        config_name: &str,
        template: &str,
        wildcards: Vec<String>,
        batch_size: u32,
        num_batches: u32,
        seed: Option<i64>,
    ) -> Self {
        let total_images = batch_size as usize * num_batches as usize;
        Self::new(
            config_name,
            PromptSource::Templated {
                template: template.to_string(),
                wildcards,
            },
            batch_size,
            num_batches,
            total_images,
            seed,
        )
    }

    /// A job with pre-resolved prompts, one image per prompt.
    pub fn fixed(config_name: &str, prompts: Vec<String>, seed: Option<i64>) -> Self {
        let total_images = prompts.len();
        Self::new(
            config_name,
            PromptSource::Fixed { prompts },
            1,
            total_images as u32,
            total_images,
            seed,
        )
    }

    fn new(
        config_name: &str,
        prompt_source: PromptSource,
        batch_size: u32,
        num_batches: u32,
        total_images: usize,
        seed: Option<i64>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            config_name: config_name.to_string(),
            status: JobStatus::Pending,
            batch_size,
            num_batches,
            total_images,
            prompt_source,
            seed,
            completed_images: 0,
            failed_images: 0,
            current_image_index: 0,
            error: None,
            retry_count: 0,
            cancel_requested: false,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            results: Vec::new(),
        }
    }

    pub fn processed_images(&self) -> usize {
        self.completed_images + self.failed_images
    }

    /// Fraction of images with an outcome, in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        if self.total_images == 0 {
            return 1.0;
        }
        self.processed_images() as f64 / self.total_images as f64
    }

    pub fn has_outcome(&self, index: usize) -> bool {
        self.results.iter().any(|r| r.index == index)
    }

    pub fn has_success(&self, index: usize) -> bool {
        self.results.iter().any(|r| r.index == index && r.success)
    }

    pub fn skipped_images(&self) -> usize {
        self.results.iter().filter(|r| r.skipped).count()
    }

    /// Record a successful image and move the cursor past it.
    pub fn record_success(&mut self, result: ImageResult) {
        let index = result.index;
        self.insert_result(result);
        self.completed_images += 1;
        self.current_image_index = self.current_image_index.max(index + 1);
        if self.retry_count > 0 {
            self.error = None;
        }
        self.retry_count = 0;
    }

    /// Record a permanently failed image and move the cursor past it.
    pub fn record_failure(&mut self, result: ImageResult) {
        let index = result.index;
        self.error = result.error.clone();
        self.insert_result(result);
        self.failed_images += 1;
        self.current_image_index = self.current_image_index.max(index + 1);
        self.retry_count = 0;
    }

    /// Mark every image without an outcome as skipped so the counters account
    /// for the whole job.
    pub fn skip_remaining(&mut self, reason: &str) {
        for index in 0..self.total_images {
            if !self.has_outcome(index) {
                self.insert_result(ImageResult::skipped(index, reason));
                self.failed_images += 1;
            }
        }
        self.current_image_index = self.total_images;
        self.retry_count = 0;
    }

    /// Move a failed or cancelled job back to pending, keeping successful images.
    pub fn reset_for_retry(&mut self) {
        self.results.retain(|r| r.success);
        self.failed_images = 0;
        self.retry_count = 0;
        self.error = None;
        self.cancel_requested = false;
        self.finished_at = None;
        self.current_image_index = (0..self.total_images)
            .find(|&i| !self.has_success(i))
            .unwrap_or(self.total_images);
        self.status = JobStatus::Pending;
    }

    pub fn finish(&mut self, status: JobStatus) {
        self.status = status;
        self.cancel_requested = false;
        self.finished_at = Some(Utc::now());
    }

    fn insert_result(&mut self, result: ImageResult) {
        let pos = self.results.partition_point(|r| r.index < result.index);
        self.results.insert(pos, result);
    }
}

/// Filter for listing jobs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub config_name: Option<String>,
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        self.status.map_or(true, |s| job.status == s)
            && self
                .config_name
                .as_deref()
                .map_or(true, |name| job.config_name == name)
    }
}
