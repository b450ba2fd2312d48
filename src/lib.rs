pub mod app;
pub mod modules;
pub mod shared;

pub use app::{FrameJobsApp, SystemHealth};
pub use modules::extraction::{
    ExtractionOutcome, FrameMetadata, FrameSource, FrameSourceProvider, FrameStorage,
    SourceProperties, VideoFrame,
};
pub use modules::jobs::{CancelAck, JobSnapshot, JobStatus, MetadataStore};
pub use shared::{AdmissionPolicy, AppConfig, AppError, AppResult};
