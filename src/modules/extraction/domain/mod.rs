pub mod entities;
pub mod ports;

pub use entities::{ExtractionOutcome, FrameMetadata, SourceProperties, StoredFrame, VideoFrame};
pub use ports::{FrameSource, FrameSourceProvider, FrameStorage};
