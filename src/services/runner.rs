//! The batch runner: claims queued jobs one at a time and drives each image
//! through the remote generation API.
//!
//! Error taxonomy:
//! - transient remote failures (connection, timeout, 429, 5xx) are retried on
//!   the same image up to `max_retries` times with backoff;
//! - permanent per-image failures (explicit rejection, unusable response,
//!   failed image write) are recorded and the batch moves on;
//! - configuration failures (missing config, missing wildcard) fail the whole
//!   job at once.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strum::{Display, EnumString};
use tokio::sync::watch;
use tokio::time::sleep;
use uuid::Uuid;

use super::generator::{GenerationRequest, ImageGenerator};
use super::prompt::PromptResolver;
use super::queue::{JobQueue, QueueError};
use super::storage::ImageStore;
use crate::config::generation::{ConfigStore, GenerationConfig};
use crate::models::job::{ImageResult, Job, JobStatus, PromptSource};

/// How the delay between retries grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// Per-image retry policy for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; an image gets at most `max_retries + 1` calls.
    pub max_retries: u32,
    pub backoff: BackoffKind,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffKind::Exponential,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let delay = match self.backoff {
            BackoffKind::Fixed => self.base_delay,
            BackoffKind::Exponential => {
                let exponent = retry.saturating_sub(1).min(16);
                self.base_delay.saturating_mul(1 << exponent)
            }
        };
        delay.min(self.max_delay)
    }
}

enum ImageOutcome {
    Recorded(Job),
    Cancelled,
    Interrupted,
}

/// Seeds are unsigned 32-bit on the generation API.
const SEED_SPACE: i64 = 1 << 32;

/// Drives queued jobs through the remote generation API.
pub struct BatchRunner {
    queue: Arc<JobQueue>,
    configs: Arc<ConfigStore>,
    resolver: Arc<PromptResolver>,
    generator: Arc<dyn ImageGenerator>,
    images: Arc<ImageStore>,
    retry: RetryPolicy,
    poll_interval: Duration,
}

impl BatchRunner {
    pub fn new(
        queue: Arc<JobQueue>,
        configs: Arc<ConfigStore>,
        resolver: Arc<PromptResolver>,
        generator: Arc<dyn ImageGenerator>,
        images: Arc<ImageStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            queue,
            configs,
            resolver,
            generator,
            images,
            retry,
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Process jobs until `shutdown` flips to `true`. The image in flight is
    /// completed, then the job goes back to `pending` and resumes from its
    /// cursor on the next start.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Batch runner started");

        while !*shutdown.borrow() {
            match self.next_job(Some(&shutdown)).await {
                Ok(true) => {
                    tracing::debug!("Job processed, checking for next job");
                    continue;
                }
                Ok(false) => tracing::trace!("No pending jobs, sleeping"),
                Err(e) => tracing::error!(error = %e, "Batch runner error, will retry"),
            }

            tokio::select! {
                _ = sleep(self.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        tracing::info!("Batch runner stopped");
    }

    /// Process pending jobs until none are left. Returns how many ran.
    pub async fn run_until_idle(&self) -> Result<usize, RunnerError> {
        let mut processed = 0;
        while self.run_next().await? {
            processed += 1;
        }
        Ok(processed)
    }

    /// Claim and process the next pending job.
    /// Returns Ok(true) if a job was processed, Ok(false) if none was pending.
    pub async fn run_next(&self) -> Result<bool, RunnerError> {
        self.next_job(None).await
    }

    async fn next_job(&self, shutdown: Option<&watch::Receiver<bool>>) -> Result<bool, RunnerError> {
        let Some(job) = self.queue.claim_next()? else {
            return Ok(false);
        };
        let id = job.id;

        tracing::info!(
            job_id = %job.id,
            config = %job.config_name,
            total_images = job.total_images,
            resume_at = job.current_image_index,
            "Processing generation job"
        );

        match self.process_job(job, shutdown).await {
            Ok(status) => {
                tracing::debug!(?status, "Job left the runner");
                Ok(true)
            }
            Err(e) => {
                // Hand the job back so it is not stranded as running.
                tracing::error!(job_id = %id, error = %e, "Job interrupted by queue error, re-queueing");
                self.queue.release(id);
                Err(e)
            }
        }
    }

    async fn process_job(
        &self,
        mut job: Job,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<JobStatus, RunnerError> {
        let config = match self.configs.load(&job.config_name) {
            Ok(config) => config,
            Err(e) => return self.fail_job(job.id, &e.to_string()),
        };

        for index in job.current_image_index..job.total_images {
            if self.queue.is_cancel_requested(job.id) {
                return self.cancel_job(job.id);
            }
            if is_stopping(shutdown) {
                return self.pause_job(job.id);
            }
            if job.has_success(index) {
                continue;
            }

            let prompt = match &job.prompt_source {
                PromptSource::Fixed { prompts } => match prompts.get(index) {
                    Some(prompt) => prompt.clone(),
                    None => {
                        return self.fail_job(job.id, &format!("No prompt for image {index}"));
                    }
                },
                PromptSource::Templated { template, .. } => {
                    match self.resolver.resolve_one(template) {
                        Ok(prompt) => prompt,
                        Err(e) => {
                            return self.fail_job(job.id, &format!("Prompt resolution failed: {e}"));
                        }
                    }
                }
            };

            let seed = seed_for(&job, &config, index);
            let request = GenerationRequest::from_config(&config, &prompt, seed);

            let outcome = self
                .generate_image(&job, &config, index, &request, shutdown)
                .await?;
            match outcome {
                ImageOutcome::Recorded(updated) => job = updated,
                ImageOutcome::Cancelled => return self.cancel_job(job.id),
                ImageOutcome::Interrupted => return self.pause_job(job.id),
            }
        }

        self.finish_job(job.id)
    }

    /// Generate one image, retrying transient failures, and record the outcome.
    async fn generate_image(
        &self,
        job: &Job,
        config: &GenerationConfig,
        index: usize,
        request: &GenerationRequest,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<ImageOutcome, RunnerError> {
        // Carries over attempts made before an interrupted shutdown.
        let mut attempts = job.retry_count;

        loop {
            attempts += 1;
            let started = Instant::now();
            let result = self.generator.generate(request).await;
            metrics::histogram!("generation_request_seconds").record(started.elapsed().as_secs_f64());

            let error = match result {
                Ok(image) => {
                    let sidecar = serde_json::json!({
                        "job_id": job.id,
                        "config": config.name,
                        "index": index,
                        "prompt": request.prompt,
                        "negative_prompt": request.negative_prompt,
                        "seed": request.seed,
                        "info": image.metadata,
                    });
                    match self
                        .images
                        .save(config.output_subdir(), job.id, index, &image.image_base64, &sidecar)
                        .await
                    {
                        Ok(image_ref) => {
                            let result = ImageResult::success(
                                index,
                                request.prompt.clone(),
                                request.seed,
                                image_ref,
                                image.metadata,
                                attempts,
                            );
                            let updated = self.queue.update_job(job.id, |j| {
                                j.record_success(result);
                                j.status = JobStatus::Running;
                            })?;
                            metrics::counter!("generation_images_completed_total").increment(1);
                            tracing::info!(
                                job_id = %job.id,
                                image_index = index,
                                attempts,
                                completed = updated.completed_images,
                                total = updated.total_images,
                                "Image generated"
                            );
                            return Ok(ImageOutcome::Recorded(updated));
                        }
                        Err(e) => format!("Failed to store image: {e}"),
                    }
                }
                Err(e) if e.is_transient() => {
                    let retry_count = attempts;
                    if retry_count <= self.retry.max_retries {
                        let delay = self.retry.delay_for(retry_count);
                        tracing::warn!(
                            job_id = %job.id,
                            image_index = index,
                            retry_count,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Transient generation failure, retrying"
                        );
                        metrics::counter!("generation_retries_total").increment(1);
                        let message = e.to_string();
                        self.queue.update_job(job.id, |j| {
                            j.status = JobStatus::Retrying;
                            j.retry_count = retry_count;
                            j.error = Some(message);
                        })?;

                        match shutdown {
                            Some(shutdown) => {
                                let mut shutdown = shutdown.clone();
                                tokio::select! {
                                    _ = sleep(delay) => {}
                                    _ = shutdown.changed() => {}
                                }
                            }
                            None => sleep(delay).await,
                        }
                        if self.queue.is_cancel_requested(job.id) {
                            return Ok(ImageOutcome::Cancelled);
                        }
                        if is_stopping(shutdown) {
                            return Ok(ImageOutcome::Interrupted);
                        }
                        self.queue.update_job(job.id, |j| j.status = JobStatus::Running)?;
                        continue;
                    }
                    format!("Failed after {attempts} attempts: {e}")
                }
                Err(e) => e.to_string(),
            };

            tracing::warn!(
                job_id = %job.id,
                image_index = index,
                attempts,
                error = %error,
                "Image failed permanently"
            );
            metrics::counter!("generation_images_failed_total").increment(1);
            let result = ImageResult::failure(
                index,
                Some(request.prompt.clone()),
                Some(request.seed),
                error,
                attempts,
            );
            let updated = self.queue.update_job(job.id, |j| {
                j.record_failure(result);
                j.status = JobStatus::Running;
            })?;
            return Ok(ImageOutcome::Recorded(updated));
        }
    }

    fn finish_job(&self, id: Uuid) -> Result<JobStatus, RunnerError> {
        let job = self.queue.update_job(id, |j| {
            j.current_image_index = j.total_images;
            if j.failed_images == 0 {
                j.finish(JobStatus::Completed);
            } else {
                let last = j
                    .results
                    .iter()
                    .rev()
                    .find_map(|r| r.error.clone())
                    .unwrap_or_default();
                j.error = Some(format!(
                    "{} of {} images failed; last error: {last}",
                    j.failed_images, j.total_images
                ));
                j.finish(JobStatus::Failed);
            }
        })?;

        tracing::info!(
            job_id = %id,
            status = %job.status,
            completed = job.completed_images,
            failed = job.failed_images,
            "Job finished"
        );
        Ok(job.status)
    }

    /// Fail the whole job without retrying; used for configuration errors.
    fn fail_job(&self, id: Uuid, reason: &str) -> Result<JobStatus, RunnerError> {
        tracing::error!(job_id = %id, error = %reason, "Job failed");
        self.queue.update_job(id, |j| {
            j.skip_remaining(reason);
            j.error = Some(reason.to_string());
            j.finish(JobStatus::Failed);
        })?;
        Ok(JobStatus::Failed)
    }

    /// Stop between images for shutdown; the job resumes from its cursor.
    fn pause_job(&self, id: Uuid) -> Result<JobStatus, RunnerError> {
        let job = self.queue.update_job(id, |j| j.status = JobStatus::Pending)?;
        tracing::info!(
            job_id = %id,
            resume_at = job.current_image_index,
            "Job paused for shutdown"
        );
        Ok(JobStatus::Pending)
    }

    fn cancel_job(&self, id: Uuid) -> Result<JobStatus, RunnerError> {
        let job = self.queue.update_job(id, |j| {
            j.skip_remaining("cancelled");
            j.finish(JobStatus::Cancelled);
        })?;
        tracing::info!(
            job_id = %id,
            completed = job.completed_images,
            skipped = job.skipped_images(),
            "Job cancelled"
        );
        Ok(JobStatus::Cancelled)
    }
}

fn is_stopping(shutdown: Option<&watch::Receiver<bool>>) -> bool {
    shutdown.is_some_and(|rx| *rx.borrow())
}

/// Explicit job seed, else the config's fixed seed, offset by image index;
/// otherwise a fresh random seed. Offsets wrap within the API's seed range.
fn seed_for(job: &Job, config: &GenerationConfig, index: usize) -> i64 {
    match job.seed {
        Some(seed) => offset_seed(seed, index),
        None if config.generation.seed >= 0 => offset_seed(config.generation.seed, index),
        None => i64::from(rand::random::<u32>()),
    }
}

fn offset_seed(seed: i64, index: usize) -> i64 {
    let offset = (index as u64 % SEED_SPACE as u64) as i64;
    (seed.rem_euclid(SEED_SPACE) + offset) % SEED_SPACE
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Queue(#[from] QueueError),
}
