use crate::modules::extraction::domain::{FrameStorage, StoredFrame};
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Frame storage on the local filesystem, one directory per job
pub struct FsFrameStorage {
    base_path: PathBuf,
}

impl FsFrameStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn job_dir(&self, job_id: Uuid) -> PathBuf {
        self.base_path.join(job_id.to_string())
    }
}

#[async_trait]
impl FrameStorage for FsFrameStorage {
    async fn write_frame(
        &self,
        job_id: Uuid,
        file_name: &str,
        bytes: &[u8],
    ) -> AppResult<StoredFrame> {
        let dir = self.job_dir(job_id);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            AppError::StorageError(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let path = dir.join(file_name);
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            AppError::StorageError(format!("Failed to write {}: {}", path.display(), e))
        })?;

        Ok(StoredFrame {
            path: path.to_string_lossy().into_owned(),
            size_bytes: bytes.len() as u64,
        })
    }
}
