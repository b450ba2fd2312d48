use crate::modules::cache::{keys, CacheManager};
use crate::modules::extraction::domain::FrameMetadata;
use crate::modules::jobs::domain::{JobSnapshot, MetadataStore};
use crate::shared::errors::{AppError, AppResult};
use crate::log_debug;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Cache-accelerated read path over the metadata store
pub struct DashboardService {
    store: Arc<dyn MetadataStore>,
    cache: Arc<CacheManager>,
    recent_frames_ttl: Duration,
}

impl DashboardService {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        cache: Arc<CacheManager>,
        recent_frames_ttl: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            recent_frames_ttl,
        }
    }

    /// Job status as last persisted, served from `status:{id}` when cached
    pub async fn get_status(&self, job_id: Uuid) -> AppResult<JobSnapshot> {
        let store = Arc::clone(&self.store);
        self.cache
            .get_or_load(
                &keys::job_status_key(job_id),
                self.cache.default_ttl(),
                || async move {
                    store.get_job(job_id).await.and_then(|job| {
                        job.ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))
                    })
                },
            )
            .await
    }

    /// Frames created in the last `since_minutes`, newest first
    pub async fn list_recent_frames(
        &self,
        since_minutes: u32,
        job_id: Option<Uuid>,
    ) -> AppResult<Vec<FrameMetadata>> {
        if since_minutes == 0 {
            return Err(AppError::ValidationError(
                "Recent frames window must be at least one minute".to_string(),
            ));
        }

        let key = keys::recent_frames_key(since_minutes, job_id);
        self.cache.track_derived(&key);

        let store = Arc::clone(&self.store);
        let frames = self
            .cache
            .get_or_load(&key, self.recent_frames_ttl, || async move {
                let since = Utc::now() - chrono::Duration::minutes(i64::from(since_minutes));
                store.list_recent_frames(since, job_id).await
            })
            .await?;

        log_debug!(
            "Recent frames ({} min, job {:?}): {} rows",
            since_minutes,
            job_id,
            frames.len()
        );
        Ok(frames)
    }

    /// Every stored frame of a job ordered by timestamp
    pub async fn list_frames(&self, job_id: Uuid) -> AppResult<Vec<FrameMetadata>> {
        let store = Arc::clone(&self.store);
        self.cache
            .get_or_load(
                &keys::job_frames_key(job_id),
                self.cache.default_ttl(),
                || async move {
                    match store.get_job(job_id).await {
                        Ok(Some(_)) => store.list_frames(job_id).await,
                        Ok(None) => Err(AppError::NotFound(format!("Job {} not found", job_id))),
                        Err(e) => Err(e),
                    }
                },
            )
            .await
    }
}
