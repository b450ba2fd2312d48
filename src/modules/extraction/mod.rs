pub mod domain;
pub mod infrastructure;
pub mod task;

pub use domain::{
    ExtractionOutcome, FrameMetadata, FrameSource, FrameSourceProvider, FrameStorage,
    SourceProperties, StoredFrame, VideoFrame,
};
pub use infrastructure::FsFrameStorage;
pub use task::{ExtractionTask, SamplingPlan};
