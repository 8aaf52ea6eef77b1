//! File-backed job queue.
//!
//! The queue keeps every job in insertion order behind one mutex. Each
//! mutating call applies its change to a copy, writes the whole collection to
//! the queue file (atomically), and only then commits the copy to memory, so a
//! failed write leaves both sides unchanged.

use chrono::Utc;
use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::persist::{self, PersistError};
use super::prompt;
use crate::config::generation::GenerationConfig;
use crate::models::job::{Job, JobFilter, JobStatus};

/// Progress of the job the runner is working on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentJob {
    pub id: Uuid,
    pub config_name: String,
    pub status: JobStatus,
    pub total_images: usize,
    pub completed_images: usize,
    pub failed_images: usize,
    pub current_image_index: usize,
    pub retry_count: u32,
    pub progress: f64,
}

impl From<&Job> for CurrentJob {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            config_name: job.config_name.clone(),
            status: job.status,
            total_images: job.total_images,
            completed_images: job.completed_images,
            failed_images: job.failed_images,
            current_image_index: job.current_image_index,
            retry_count: job.retry_count,
            progress: job.progress(),
        }
    }
}

/// Aggregate snapshot of the queue, recomputed on every call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueStats {
    pub total_jobs: usize,
    pub pending_jobs: usize,
    /// Includes jobs between retry attempts.
    pub running_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    pub cancelled_jobs: usize,
    pub total_images: usize,
    pub completed_images: usize,
    pub failed_images: usize,
    pub current_job: Option<CurrentJob>,
}

/// What `request_cancel` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The job had not started and is now cancelled.
    Cancelled,
    /// The job is running; the runner stops it before the next image.
    Requested,
}

/// Ordered, persisted collection of generation jobs.
pub struct JobQueue {
    path: PathBuf,
    jobs: Mutex<Vec<Job>>,
    _lock: File,
}

impl JobQueue {
    /// Open the queue at `path`, taking an exclusive lock on `{path}.lock`.
    ///
    /// Jobs left `running` or `retrying` by a previous process are put back to
    /// `pending` with their progress cursor intact so they resume where they
    /// stopped.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(PersistError::from)?;
            }
        }

        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(PersistError::from)?;
        lock.try_lock_exclusive()
            .map_err(|_| QueueError::Locked(path.clone()))?;

        let mut jobs: Vec<Job> = persist::read_json_or_quarantine(&path)?.unwrap_or_default();

        let mut recovered = 0;
        for job in jobs.iter_mut().filter(|j| j.status.is_active()) {
            job.status = JobStatus::Pending;
            job.updated_at = Utc::now();
            recovered += 1;
        }
        if recovered > 0 {
            tracing::info!(recovered, "Re-queued jobs interrupted by a previous shutdown");
            persist::write_json_atomic(&path, &jobs)?;
        }

        tracing::info!(path = %path.display(), jobs = jobs.len(), "Job queue loaded");

        Ok(Self {
            path,
            jobs: Mutex::new(jobs),
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue a template-driven job of `batch_size * num_batches` images.
    pub fn add_job(
        &self,
        config: &GenerationConfig,
        batch_size: u32,
        num_batches: u32,
        seed: Option<i64>,
    ) -> Result<Job, QueueError> {
        if batch_size == 0 || num_batches == 0 {
            return Err(QueueError::InvalidJob(
                "batch_size and num_batches must be at least 1".to_string(),
            ));
        }

        let template = &config.prompt.positive;
        let job = Job::templated(
            &config.name,
            template,
            prompt::placeholders(template),
            batch_size,
            num_batches,
            seed,
        );
        self.insert(job)
    }

    /// Queue a job whose prompts were resolved up front.
    pub fn add_job_with_prompts(
        &self,
        config: &GenerationConfig,
        prompts: Vec<String>,
        seed: Option<i64>,
    ) -> Result<Job, QueueError> {
        if prompts.is_empty() {
            return Err(QueueError::InvalidJob("prompts must not be empty".to_string()));
        }
        self.insert(Job::fixed(&config.name, prompts, seed))
    }

    fn insert(&self, job: Job) -> Result<Job, QueueError> {
        let mut jobs = self.jobs.lock();
        jobs.push(job.clone());
        if let Err(e) = self.persist(&jobs) {
            jobs.pop();
            return Err(e);
        }

        tracing::info!(
            job_id = %job.id,
            config = %job.config_name,
            total_images = job.total_images,
            "Job queued"
        );
        metrics::counter!("generation_jobs_submitted_total").increment(1);
        Ok(job)
    }

    /// Apply `mutator` to job `id` and persist. Returns the updated job.
    pub fn update_job<F>(&self, id: Uuid, mutator: F) -> Result<Job, QueueError>
    where
        F: FnOnce(&mut Job),
    {
        self.try_update_job(id, |job| {
            mutator(job);
            Ok(())
        })
    }

    /// Like [`update_job`](Self::update_job), but the mutator may refuse the
    /// change, in which case nothing is written.
    pub fn try_update_job<F>(&self, id: Uuid, mutator: F) -> Result<Job, QueueError>
    where
        F: FnOnce(&mut Job) -> Result<(), QueueError>,
    {
        let mut jobs = self.jobs.lock();
        let idx = jobs
            .iter()
            .position(|j| j.id == id)
            .ok_or(QueueError::NotFound(id))?;

        let mut updated = jobs[idx].clone();
        mutator(&mut updated)?;
        updated.updated_at = Utc::now();

        let previous = std::mem::replace(&mut jobs[idx], updated);
        if let Err(e) = self.persist(&jobs) {
            jobs[idx] = previous;
            return Err(e);
        }
        Ok(jobs[idx].clone())
    }

    /// Remove a job that is not currently being processed.
    pub fn remove_job(&self, id: Uuid) -> Result<Job, QueueError> {
        let mut jobs = self.jobs.lock();
        let idx = jobs
            .iter()
            .position(|j| j.id == id)
            .ok_or(QueueError::NotFound(id))?;
        if jobs[idx].status.is_active() {
            return Err(QueueError::InvalidState {
                id,
                status: jobs[idx].status,
                action: "remove",
            });
        }

        let removed = jobs.remove(idx);
        if let Err(e) = self.persist(&jobs) {
            jobs.insert(idx, removed);
            return Err(e);
        }
        tracing::info!(job_id = %id, "Job removed");
        Ok(removed)
    }

    /// Remove every job in a terminal state. Returns how many were removed.
    pub fn clear_finished(&self) -> Result<usize, QueueError> {
        let mut jobs = self.jobs.lock();
        let kept: Vec<Job> = jobs
            .iter()
            .filter(|j| !j.status.is_terminal())
            .cloned()
            .collect();
        let removed = jobs.len() - kept.len();
        if removed > 0 {
            self.persist(&kept)?;
            *jobs = kept;
        }
        Ok(removed)
    }

    pub fn get_job(&self, id: Uuid) -> Option<Job> {
        self.jobs.lock().iter().find(|j| j.id == id).cloned()
    }

    /// Jobs matching `filter`, in queue order.
    pub fn list_jobs(&self, filter: &JobFilter) -> Vec<Job> {
        self.jobs
            .lock()
            .iter()
            .filter(|j| filter.matches(j))
            .cloned()
            .collect()
    }

    /// Every job, in queue order.
    pub fn snapshot(&self) -> Vec<Job> {
        self.jobs.lock().clone()
    }

    pub fn get_queue_stats(&self) -> QueueStats {
        let jobs = self.jobs.lock();
        let mut stats = QueueStats {
            total_jobs: jobs.len(),
            ..QueueStats::default()
        };

        for job in jobs.iter() {
            match job.status {
                JobStatus::Pending => stats.pending_jobs += 1,
                JobStatus::Running | JobStatus::Retrying => stats.running_jobs += 1,
                JobStatus::Completed => stats.completed_jobs += 1,
                JobStatus::Failed => stats.failed_jobs += 1,
                JobStatus::Cancelled => stats.cancelled_jobs += 1,
            }
            stats.total_images += job.total_images;
            stats.completed_images += job.completed_images;
            stats.failed_images += job.failed_images;
        }
        stats.current_job = jobs
            .iter()
            .find(|j| j.status.is_active())
            .map(CurrentJob::from);
        stats
    }

    /// Claim the oldest pending job for the runner, marking it `running`.
    pub fn claim_next(&self) -> Result<Option<Job>, QueueError> {
        let mut jobs = self.jobs.lock();
        let Some(idx) = jobs.iter().position(|j| j.status == JobStatus::Pending) else {
            return Ok(None);
        };

        let previous = jobs[idx].clone();
        let now = Utc::now();
        let job = &mut jobs[idx];
        job.status = JobStatus::Running;
        job.started_at.get_or_insert(now);
        job.updated_at = now;

        if let Err(e) = self.persist(&jobs) {
            jobs[idx] = previous;
            return Err(e);
        }
        Ok(Some(jobs[idx].clone()))
    }

    /// Put an active job back to `pending` after the runner gave up on it
    /// mid-run, keeping its cursor.
    ///
    /// The in-memory change stands even when the write fails; an active job
    /// on disk is re-queued by the next [`open`](Self::open) anyway.
    pub fn release(&self, id: Uuid) {
        let mut jobs = self.jobs.lock();
        let Some(job) = jobs.iter_mut().find(|j| j.id == id && j.status.is_active()) else {
            return;
        };
        job.status = JobStatus::Pending;
        job.updated_at = Utc::now();

        if let Err(e) = self.persist(&jobs) {
            tracing::warn!(job_id = %id, error = %e, "Released job is pending in memory only");
        }
    }

    /// Cancel a pending job outright, or flag an active one for the runner.
    pub fn request_cancel(&self, id: Uuid) -> Result<CancelOutcome, QueueError> {
        let mut outcome = CancelOutcome::Requested;
        self.try_update_job(id, |job| {
            match job.status {
                JobStatus::Pending => {
                    job.skip_remaining("cancelled before generation");
                    job.finish(JobStatus::Cancelled);
                    outcome = CancelOutcome::Cancelled;
                }
                JobStatus::Running | JobStatus::Retrying => {
                    job.cancel_requested = true;
                }
                status => {
                    return Err(QueueError::InvalidState {
                        id,
                        status,
                        action: "cancel",
                    })
                }
            }
            Ok(())
        })?;
        tracing::info!(job_id = %id, ?outcome, "Job cancellation");
        Ok(outcome)
    }

    /// Re-queue a failed or cancelled job, keeping its successful images.
    pub fn retry_job(&self, id: Uuid) -> Result<Job, QueueError> {
        let job = self.try_update_job(id, |job| {
            if !matches!(job.status, JobStatus::Failed | JobStatus::Cancelled) {
                return Err(QueueError::InvalidState {
                    id,
                    status: job.status,
                    action: "retry",
                });
            }
            if job.completed_images >= job.total_images {
                return Err(QueueError::InvalidJob(
                    "job has no unsuccessful images to retry".to_string(),
                ));
            }
            job.reset_for_retry();
            Ok(())
        })?;
        tracing::info!(
            job_id = %id,
            resume_at = job.current_image_index,
            "Job re-queued for retry"
        );
        Ok(job)
    }

    pub fn is_cancel_requested(&self, id: Uuid) -> bool {
        self.jobs
            .lock()
            .iter()
            .find(|j| j.id == id)
            .is_some_and(|j| j.cancel_requested)
    }

    /// Write `jobs` to the queue file. Called with the lock held.
    fn persist(&self, jobs: &[Job]) -> Result<(), QueueError> {
        persist::write_json_atomic(&self.path, jobs).map_err(|e| {
            tracing::error!(error = %e, path = %self.path.display(), "Failed to persist job queue");
            QueueError::Persist(e)
        })?;
        metrics::gauge!("generation_queue_pending")
            .set(jobs.iter().filter(|j| j.status == JobStatus::Pending).count() as f64);
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("Cannot {action} job {id} while it is {status}")]
    InvalidState {
        id: Uuid,
        status: JobStatus,
        action: &'static str,
    },

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Queue file {0} is locked by another process")]
    Locked(PathBuf),

    #[error("Queue persistence failed: {0}")]
    Persist(#[from] PersistError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::generation::{GenerationParams, ModelSettings, OutputSettings, PromptTemplate};
    use crate::models::job::ImageResult;

    fn config(template: &str) -> GenerationConfig {
        GenerationConfig {
            name: "portrait".to_string(),
            model: ModelSettings::default(),
            generation: GenerationParams::default(),
            prompt: PromptTemplate {
                positive: template.to_string(),
                negative: String::new(),
            },
            output: OutputSettings::default(),
        }
    }

    fn open_queue() -> (tempfile::TempDir, JobQueue) {
        let dir = tempfile::tempdir().unwrap();
        let queue = JobQueue::open(dir.path().join("queue.json")).unwrap();
        (dir, queue)
    }

    #[test]
    fn test_add_job_persists() {
        let (dir, queue) = open_queue();
        let job = queue.add_job(&config("a __animal__"), 2, 3, None).unwrap();
        assert_eq!(job.total_images, 6);
        assert_eq!(job.status, JobStatus::Pending);

        let raw = std::fs::read_to_string(dir.path().join("queue.json")).unwrap();
        let on_disk: Vec<Job> = serde_json::from_str(&raw).unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk[0].id, job.id);
    }

    #[test]
    fn test_add_job_with_prompts_sizes_from_prompts() {
        let (_dir, queue) = open_queue();
        let prompts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let job = queue.add_job_with_prompts(&config("x"), prompts, None).unwrap();
        assert_eq!(job.total_images, 3);
    }

    #[test]
    fn test_rejects_empty_jobs() {
        let (_dir, queue) = open_queue();
        assert!(matches!(
            queue.add_job(&config("x"), 0, 1, None),
            Err(QueueError::InvalidJob(_))
        ));
        assert!(matches!(
            queue.add_job_with_prompts(&config("x"), vec![], None),
            Err(QueueError::InvalidJob(_))
        ));
        assert_eq!(queue.get_queue_stats().total_jobs, 0);
    }

    #[test]
    fn test_claim_is_fifo() {
        let (_dir, queue) = open_queue();
        let a = queue.add_job(&config("a"), 1, 1, None).unwrap();
        let b = queue.add_job(&config("b"), 1, 1, None).unwrap();

        let first = queue.claim_next().unwrap().unwrap();
        assert_eq!(first.id, a.id);
        assert_eq!(first.status, JobStatus::Running);
        assert!(first.started_at.is_some());

        let second = queue.claim_next().unwrap().unwrap();
        assert_eq!(second.id, b.id);
        assert!(queue.claim_next().unwrap().is_none());
    }

    #[test]
    fn test_update_job_touches_updated_at() {
        let (_dir, queue) = open_queue();
        let job = queue.add_job(&config("a"), 1, 1, None).unwrap();
        let updated = queue
            .update_job(job.id, |j| j.error = Some("x".to_string()))
            .unwrap();
        assert!(updated.updated_at >= job.updated_at);
        assert_eq!(queue.get_job(job.id).unwrap().error.as_deref(), Some("x"));
    }

    #[test]
    fn test_refused_update_writes_nothing() {
        let (_dir, queue) = open_queue();
        let job = queue.add_job(&config("a"), 1, 1, None).unwrap();
        let err = queue
            .try_update_job(job.id, |j| {
                j.error = Some("partial".to_string());
                Err(QueueError::InvalidJob("no".to_string()))
            })
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidJob(_)));
        assert!(queue.get_job(job.id).unwrap().error.is_none());
    }

    #[test]
    fn test_unknown_job() {
        let (_dir, queue) = open_queue();
        let id = Uuid::new_v4();
        assert!(matches!(queue.update_job(id, |_| {}), Err(QueueError::NotFound(_))));
        assert!(matches!(queue.remove_job(id), Err(QueueError::NotFound(_))));
        assert!(queue.get_job(id).is_none());
    }

    #[test]
    fn test_cannot_remove_active_job() {
        let (_dir, queue) = open_queue();
        let job = queue.add_job(&config("a"), 1, 1, None).unwrap();
        queue.claim_next().unwrap();
        assert!(matches!(
            queue.remove_job(job.id),
            Err(QueueError::InvalidState { action: "remove", .. })
        ));
    }

    #[test]
    fn test_stats_and_current_job() {
        let (_dir, queue) = open_queue();
        let running = queue.add_job(&config("a"), 10, 1, None).unwrap();
        queue.add_job(&config("b"), 2, 1, None).unwrap();
        queue.claim_next().unwrap();
        for i in 0..3 {
            queue
                .update_job(running.id, |j| {
                    j.record_success(ImageResult::success(
                        i,
                        "a".to_string(),
                        i as i64,
                        format!("{i}.png"),
                        serde_json::json!({}),
                        1,
                    ))
                })
                .unwrap();
        }

        let stats = queue.get_queue_stats();
        assert_eq!(stats.total_jobs, 2);
        assert_eq!(stats.pending_jobs, 1);
        assert_eq!(stats.running_jobs, 1);
        assert_eq!(stats.total_images, 12);
        assert_eq!(stats.completed_images, 3);
        let current = stats.current_job.unwrap();
        assert_eq!(current.id, running.id);
        assert_eq!(current.completed_images, 3);
        assert_eq!(current.total_images, 10);
    }

    #[test]
    fn test_cancel_pending_finalizes() {
        let (_dir, queue) = open_queue();
        let job = queue.add_job(&config("a"), 3, 1, None).unwrap();
        assert_eq!(queue.request_cancel(job.id).unwrap(), CancelOutcome::Cancelled);

        let job = queue.get_job(job.id).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.processed_images(), job.total_images);
        assert_eq!(job.skipped_images(), 3);
        assert!(matches!(
            queue.request_cancel(job.id),
            Err(QueueError::InvalidState { action: "cancel", .. })
        ));
    }

    #[test]
    fn test_cancel_running_sets_flag() {
        let (_dir, queue) = open_queue();
        let job = queue.add_job(&config("a"), 3, 1, None).unwrap();
        queue.claim_next().unwrap();
        assert_eq!(queue.request_cancel(job.id).unwrap(), CancelOutcome::Requested);
        assert!(queue.is_cancel_requested(job.id));
        assert_eq!(queue.get_job(job.id).unwrap().status, JobStatus::Running);
    }

    #[test]
    fn test_retry_only_failed_or_cancelled() {
        let (_dir, queue) = open_queue();
        let job = queue.add_job(&config("a"), 2, 1, None).unwrap();
        assert!(matches!(
            queue.retry_job(job.id),
            Err(QueueError::InvalidState { action: "retry", .. })
        ));

        queue.request_cancel(job.id).unwrap();
        let retried = queue.retry_job(job.id).unwrap();
        assert_eq!(retried.status, JobStatus::Pending);
        assert_eq!(retried.failed_images, 0);
        assert_eq!(retried.current_image_index, 0);
        assert!(retried.results.is_empty());
    }

    #[test]
    fn test_clear_finished() {
        let (_dir, queue) = open_queue();
        let done = queue.add_job(&config("a"), 1, 1, None).unwrap();
        queue.add_job(&config("b"), 1, 1, None).unwrap();
        queue.request_cancel(done.id).unwrap();

        assert_eq!(queue.clear_finished().unwrap(), 1);
        assert_eq!(queue.snapshot().len(), 1);
        assert!(queue.get_job(done.id).is_none());
    }

    #[test]
    fn test_reopen_recovers_interrupted_job() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        let id = {
            let queue = JobQueue::open(&path).unwrap();
            let job = queue.add_job(&config("a"), 5, 1, None).unwrap();
            queue.claim_next().unwrap();
            queue
                .update_job(job.id, |j| {
                    j.record_success(ImageResult::success(
                        0,
                        "a".to_string(),
                        1,
                        "0.png".to_string(),
                        serde_json::json!({}),
                        1,
                    ));
                    j.status = JobStatus::Retrying;
                    j.retry_count = 2;
                })
                .unwrap();
            job.id
        };

        let queue = JobQueue::open(&path).unwrap();
        let job = queue.get_job(id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.current_image_index, 1);
        assert_eq!(job.completed_images, 1);
        assert_eq!(job.retry_count, 2);
    }

    #[test]
    fn test_second_open_is_locked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        let _queue = JobQueue::open(&path).unwrap();
        assert!(dir.path().join("queue.json.lock").exists());
        assert!(matches!(JobQueue::open(&path), Err(QueueError::Locked(_))));
    }

    /// Swap the queue file for a directory so every atomic rename fails.
    fn break_queue_file(dir: &tempfile::TempDir) {
        let path = dir.path().join("queue.json");
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
    }

    #[test]
    fn test_failed_write_leaves_memory_unchanged() {
        let (dir, queue) = open_queue();
        let queued = queue.add_job(&config("a"), 2, 1, None).unwrap();
        let done = queue.add_job(&config("b"), 1, 1, None).unwrap();
        queue
            .update_job(done.id, |j| j.finish(JobStatus::Completed))
            .unwrap();
        let before = queue.snapshot();
        break_queue_file(&dir);

        assert!(matches!(
            queue.add_job(&config("c"), 1, 1, None),
            Err(QueueError::Persist(_))
        ));
        assert!(matches!(
            queue.update_job(queued.id, |j| j.error = Some("x".to_string())),
            Err(QueueError::Persist(_))
        ));
        assert!(matches!(queue.claim_next(), Err(QueueError::Persist(_))));
        assert!(matches!(queue.remove_job(done.id), Err(QueueError::Persist(_))));
        assert!(matches!(queue.clear_finished(), Err(QueueError::Persist(_))));

        let after = queue.snapshot();
        assert_eq!(after.len(), before.len());
        for (a, b) in after.iter().zip(&before) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.status, b.status);
            assert_eq!(a.error, b.error);
            assert_eq!(a.updated_at, b.updated_at);
        }
    }

    #[test]
    fn test_release_requeues_active_job_even_if_write_fails() {
        let (dir, queue) = open_queue();
        let job = queue.add_job(&config("a"), 3, 1, None).unwrap();
        queue.claim_next().unwrap();
        queue
            .update_job(job.id, |j| {
                j.record_success(ImageResult::success(
                    0,
                    "a".to_string(),
                    1,
                    "0.png".to_string(),
                    serde_json::json!({}),
                    1,
                ))
            })
            .unwrap();
        break_queue_file(&dir);

        queue.release(job.id);
        let released = queue.get_job(job.id).unwrap();
        assert_eq!(released.status, JobStatus::Pending);
        assert_eq!(released.current_image_index, 1);
        assert!(queue.get_queue_stats().current_job.is_none());

        // Terminal jobs are left alone.
        std::fs::remove_dir(dir.path().join("queue.json")).unwrap();
        queue
            .update_job(job.id, |j| j.finish(JobStatus::Failed))
            .unwrap();
        queue.release(job.id);
        assert_eq!(queue.get_job(job.id).unwrap().status, JobStatus::Failed);
    }
}
