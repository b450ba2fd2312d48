/// Authoritative in-memory job registry
///
/// Every job lives in a sharded map entry with its own state lock and its
/// own persistence lock. State locks are held only for the in-memory mutation;
/// the persistence lock spans mutate, store write and cache invalidation so a
/// job's store writes land in the order its mutations happened. A mutation
/// whose store write fails is rolled back.
use crate::modules::cache::CacheManager;
use crate::modules::extraction::domain::FrameMetadata;
use crate::modules::jobs::domain::{CancelAck, Job, JobSnapshot, JobStatus, MetadataStore};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::LogContext;
use crate::{log_debug, log_error, log_info};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct JobEntry {
    state: Mutex<Job>,
    persist: Mutex<()>,
    cancel: CancellationToken,
}

pub struct JobRegistry {
    jobs: DashMap<Uuid, Arc<JobEntry>>,
    store: Arc<dyn MetadataStore>,
    cache: Arc<CacheManager>,
}

impl JobRegistry {
    pub fn new(store: Arc<dyn MetadataStore>, cache: Arc<CacheManager>) -> Self {
        Self {
            jobs: DashMap::new(),
            store,
            cache,
        }
    }

    /// Validate and register a new Pending job
    pub async fn submit(&self, source: &str, interval_seconds: f64) -> AppResult<Uuid> {
        let job = Job::new(source, interval_seconds)?;
        let job_id = job.id;

        self.store.create_job(&job).await?;
        self.jobs.insert(
            job_id,
            Arc::new(JobEntry {
                state: Mutex::new(job),
                persist: Mutex::new(()),
                cancel: CancellationToken::new(),
            }),
        );

        log_info!(
            "Job {} submitted (source: {}, interval: {}s)",
            job_id,
            source.trim(),
            interval_seconds
        );
        Ok(job_id)
    }

    /// Current in-memory snapshot; never waits on store writes
    pub async fn get_status(&self, job_id: Uuid) -> AppResult<JobSnapshot> {
        let entry = self.entry(job_id)?;
        let job = entry.state.lock().await;
        Ok(job.clone())
    }

    /// Flag a job for cancellation.
    ///
    /// Pending jobs are cancelled on the spot. Processing jobs get their
    /// cancellation token triggered once the request is persisted and stop at
    /// the worker's next checkpoint.
    pub async fn request_cancel(&self, job_id: Uuid) -> AppResult<CancelAck> {
        let entry = self.entry(job_id)?;
        let token = entry.cancel.clone();

        let outcome = self
            .mutate(job_id, |job| {
                match job.status {
                    JobStatus::Pending => {
                        job.cancel_requested = true;
                        job.transition_to(JobStatus::Cancelled)?;
                        LogContext::job_transition(&job.id, "pending", "cancelled");
                    }
                    JobStatus::Processing => {
                        job.cancel_requested = true;
                        log_info!("Job {}: cancellation requested", job.id);
                    }
                    status => {
                        return Err(AppError::Conflict(format!(
                            "Job {} is already {}",
                            job.id, status
                        )));
                    }
                }
                Ok(Some(job.status))
            })
            .await?;

        let status = match outcome {
            Some((status, _)) => status,
            None => entry.state.lock().await.status,
        };
        if status == JobStatus::Processing {
            token.cancel();
        }
        Ok(CancelAck { job_id, status })
    }

    /// Move a job from Pending to Processing.
    ///
    /// Returns `None` when the job is no longer runnable, e.g. it was
    /// cancelled while waiting in the queue.
    pub async fn begin_processing(
        &self,
        job_id: Uuid,
    ) -> AppResult<Option<(JobSnapshot, CancellationToken)>> {
        let entry = self.entry(job_id)?;

        let started = self
            .mutate(job_id, |job| {
                if job.status != JobStatus::Pending {
                    return Ok(None);
                }
                job.transition_to(JobStatus::Processing)?;
                LogContext::job_transition(&job.id, "pending", "processing");
                Ok(Some(()))
            })
            .await?;

        Ok(started.map(|((), snapshot)| (snapshot, entry.cancel.clone())))
    }

    /// Apply a progress report from the job's worker
    pub async fn update_progress(
        &self,
        job_id: Uuid,
        processed: u64,
        total: Option<u64>,
    ) -> AppResult<JobSnapshot> {
        let updated = self
            .mutate(job_id, |job| {
                if job.status != JobStatus::Processing {
                    return Err(AppError::Conflict(format!(
                        "Job {} is {}, progress only applies while processing",
                        job.id, job.status
                    )));
                }
                job.apply_progress(processed, total);
                LogContext::extraction_progress(&job.id, job.processed_frames, job.total_frames);
                Ok(Some(()))
            })
            .await?;

        updated
            .map(|((), snapshot)| snapshot)
            .ok_or_else(|| AppError::InternalError(format!("Job {} progress lost", job_id)))
    }

    /// Commit a terminal status. The first caller wins; once a job is terminal
    /// later calls change nothing and return `false`.
    pub async fn mark_terminal(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
    ) -> AppResult<bool> {
        if !status.is_terminal() {
            return Err(AppError::ValidationError(format!(
                "{} is not a terminal status",
                status
            )));
        }

        let committed = self
            .mutate(job_id, |job| {
                if job.is_terminal() {
                    log_debug!(
                        "Job {} already {}, ignoring transition to {}",
                        job.id,
                        job.status,
                        status
                    );
                    return Ok(None);
                }

                let from = job.status.to_string();
                job.transition_to(status)?;
                if status == JobStatus::Failed {
                    job.error_message = error_message;
                }
                LogContext::job_transition(&job.id, &from, &status.to_string());
                Ok(Some(()))
            })
            .await?;

        Ok(committed.is_some())
    }

    /// Persist one extracted frame and invalidate the views derived from it
    pub async fn record_frame(&self, frame: &FrameMetadata) -> AppResult<()> {
        self.entry(frame.job_id)?;
        self.store.insert_frame_metadata(frame).await?;
        self.cache.invalidate_job_frames(frame.job_id).await;
        Ok(())
    }

    /// Number of jobs currently in `status`
    pub async fn count_in(&self, status: JobStatus) -> usize {
        // Collect first so no shard lock is held across the awaits below
        let entries: Vec<Arc<JobEntry>> = self.jobs.iter().map(|e| e.value().clone()).collect();

        let mut count = 0;
        for entry in entries {
            if entry.state.lock().await.status == status {
                count += 1;
            }
        }
        count
    }

    fn entry(&self, job_id: Uuid) -> AppResult<Arc<JobEntry>> {
        self.jobs
            .get(&job_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))
    }

    /// Run `f` against the job under its persistence lock. When `f` reports a
    /// change, the new snapshot is written to the store and the job's cached
    /// views are invalidated before the lock is released. If `f` fails or the
    /// store write fails, the job is restored to its prior state.
    async fn mutate<R, F>(&self, job_id: Uuid, f: F) -> AppResult<Option<(R, JobSnapshot)>>
    where
        F: FnOnce(&mut Job) -> AppResult<Option<R>>,
    {
        let entry = self.entry(job_id)?;
        let _persist = entry.persist.lock().await;

        let (result, snapshot, previous) = {
            let mut job = entry.state.lock().await;
            let previous = job.clone();
            match f(&mut job) {
                Ok(Some(result)) => (result, job.clone(), previous),
                Ok(None) => return Ok(None),
                Err(e) => {
                    *job = previous;
                    return Err(e);
                }
            }
        };

        if let Err(e) = self.store.update_job(&snapshot).await {
            LogContext::error_with_context(&e, &format!("Persisting job {}", job_id));
            log_error!("Job {} store write failed, reverting to {}", job_id, previous.status);
            *entry.state.lock().await = previous;
            self.cache.invalidate_job(job_id).await;
            return Err(e);
        }
        self.cache.invalidate_job(job_id).await;

        Ok(Some((result, snapshot)))
    }
}
