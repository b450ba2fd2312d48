pub mod entities;
pub mod repository;

pub use entities::{CancelAck, Job, JobSnapshot, JobStatus};
pub use repository::MetadataStore;
