/// Ports to the external collaborators of an extraction run
use crate::modules::extraction::domain::entities::{SourceProperties, StoredFrame, VideoFrame};
use crate::shared::errors::AppResult;
use async_trait::async_trait;
use uuid::Uuid;

/// Opens video sources. Implementations wrap a decoder library.
pub trait FrameSourceProvider: Send + Sync {
    /// Open `source`; unreadable sources fail with `AppError::SourceError`
    fn open(&self, source: &str) -> AppResult<Box<dyn FrameSource>>;
}

/// An opened video yielding decoded frames in presentation order.
///
/// Calls may block on decoding; the extraction task only invokes them from
/// the blocking thread pool.
pub trait FrameSource: Send {
    fn properties(&self) -> SourceProperties;

    /// Next frame, or `None` at end of stream
    fn next_frame(&mut self) -> AppResult<Option<VideoFrame>>;
}

/// Persists encoded frame images
#[async_trait]
pub trait FrameStorage: Send + Sync {
    /// Write `bytes` as `file_name` inside the job's directory
    async fn write_frame(&self, job_id: Uuid, file_name: &str, bytes: &[u8])
        -> AppResult<StoredFrame>;
}
