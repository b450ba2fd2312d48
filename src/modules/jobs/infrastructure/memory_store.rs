/// In-process implementation of MetadataStore
///
/// Keeps job records and frame rows in memory. Used when no database is
/// wired in and throughout the test suite.
use crate::modules::extraction::domain::FrameMetadata;
use crate::modules::jobs::domain::entities::Job;
use crate::modules::jobs::domain::repository::MetadataStore;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::LogContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryMetadataStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
    frames: RwLock<Vec<FrameMetadata>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored frame rows across all jobs
    pub async fn frame_count(&self) -> usize {
        self.frames.read().await.len()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn create_job(&self, job: &Job) -> AppResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(AppError::Conflict(format!("Job {} already exists", job.id)));
        }
        jobs.insert(job.id, job.clone());
        LogContext::store_operation("create_job", &job.id.to_string(), None);
        Ok(())
    }

    async fn update_job(&self, job: &Job) -> AppResult<()> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(stored) => {
                *stored = job.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Job {} not found", job.id))),
        }
    }

    async fn get_job(&self, job_id: Uuid) -> AppResult<Option<Job>> {
        Ok(self.jobs.read().await.get(&job_id).cloned())
    }

    async fn list_recent_frames(
        &self,
        since: DateTime<Utc>,
        job_id: Option<Uuid>,
    ) -> AppResult<Vec<FrameMetadata>> {
        let frames = self.frames.read().await;
        let mut recent: Vec<FrameMetadata> = frames
            .iter()
            .filter(|f| f.created_at >= since)
            .filter(|f| job_id.map_or(true, |id| f.job_id == id))
            .cloned()
            .collect();

        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(recent)
    }

    async fn insert_frame_metadata(&self, frame: &FrameMetadata) -> AppResult<()> {
        if !self.jobs.read().await.contains_key(&frame.job_id) {
            return Err(AppError::NotFound(format!(
                "Job {} not found for frame {}",
                frame.job_id, frame.id
            )));
        }
        self.frames.write().await.push(frame.clone());
        Ok(())
    }

    async fn list_frames(&self, job_id: Uuid) -> AppResult<Vec<FrameMetadata>> {
        let frames = self.frames.read().await;
        let mut rows: Vec<FrameMetadata> = frames
            .iter()
            .filter(|f| f.job_id == job_id)
            .cloned()
            .collect();

        rows.sort_by(|a, b| {
            a.timestamp_in_video
                .total_cmp(&b.timestamp_in_video)
                .then(a.sample_index.cmp(&b.sample_index))
        });
        Ok(rows)
    }
}
