/// Repository trait for the durable metadata store
///
/// The store keeps job records and frame metadata. It is the source of truth
/// the cached read path rebuilds from; the in-memory registry mirrors every
/// change into it.
use crate::modules::extraction::domain::FrameMetadata;
use crate::modules::jobs::domain::entities::Job;
use crate::shared::errors::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a freshly submitted job
    async fn create_job(&self, job: &Job) -> AppResult<()>;

    /// Overwrite the stored record with the given snapshot
    async fn update_job(&self, job: &Job) -> AppResult<()>;

    /// Get job by ID
    async fn get_job(&self, job_id: Uuid) -> AppResult<Option<Job>>;

    /// Frames created at or after `since`, newest first, optionally for one job
    async fn list_recent_frames(
        &self,
        since: DateTime<Utc>,
        job_id: Option<Uuid>,
    ) -> AppResult<Vec<FrameMetadata>>;

    /// Insert one frame row; rows are never updated afterwards
    async fn insert_frame_metadata(&self, frame: &FrameMetadata) -> AppResult<()>;

    /// All frames of a job ordered by position in the video
    async fn list_frames(&self, job_id: Uuid) -> AppResult<Vec<FrameMetadata>>;
}
