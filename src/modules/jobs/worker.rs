/// Runs one admitted job from start to its terminal state
///
/// A worker owns exactly one job: it claims it in the registry, drives the
/// extraction task, and commits the outcome. Extraction errors end up as
/// `Failed` with the error message; they never escape the worker.
use crate::modules::extraction::domain::ExtractionOutcome;
use crate::modules::extraction::task::ExtractionTask;
use crate::modules::jobs::domain::JobStatus;
use crate::modules::jobs::registry::JobRegistry;
use crate::shared::errors::AppResult;
use crate::shared::utils::TimedOperation;
use crate::{log_debug, log_error, log_info, log_warn};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct JobWorker {
    registry: Arc<JobRegistry>,
    task: Arc<ExtractionTask>,
}

impl JobWorker {
    pub fn new(registry: Arc<JobRegistry>, task: Arc<ExtractionTask>) -> Self {
        Self { registry, task }
    }

    /// Process `job_id`. Returns the terminal status committed by this worker,
    /// or `None` if the job was no longer runnable.
    pub async fn run(&self, job_id: Uuid) -> AppResult<Option<JobStatus>> {
        let Some((job, cancel)) = self.registry.begin_processing(job_id).await? else {
            log_debug!("Job {} is no longer pending, skipping", job_id);
            return Ok(None);
        };

        log_info!("Processing job {} (source: {})", job_id, job.source);
        let timer = TimedOperation::new(&format!("job {}", job_id));

        let (status, error_message) = match self.task.run(&job, &cancel).await {
            Ok(ExtractionOutcome::Completed {
                sampled_frames,
                stored_frames,
            }) => {
                timer.finish_with_info(&format!(
                    "{} sampled, {} stored",
                    sampled_frames, stored_frames
                ));
                (JobStatus::Completed, None)
            }
            Ok(ExtractionOutcome::Cancelled { sampled_frames }) => {
                timer.finish_with_info(&format!("cancelled after {} samples", sampled_frames));
                (JobStatus::Cancelled, None)
            }
            Err(e) => {
                timer.finish();
                log_warn!("Job {} failed: {}", job_id, e);
                (JobStatus::Failed, Some(e.to_string()))
            }
        };

        match self
            .registry
            .mark_terminal(job_id, status, error_message)
            .await
        {
            Ok(true) => Ok(Some(status)),
            Ok(false) => {
                let current = self.registry.get_status(job_id).await?;
                log_debug!(
                    "Job {} was already {} when the worker finished",
                    job_id,
                    current.status
                );
                Ok(Some(current.status))
            }
            Err(e) => {
                log_error!("Failed to record outcome of job {}: {}", job_id, e);
                Err(e)
            }
        }
    }
}
