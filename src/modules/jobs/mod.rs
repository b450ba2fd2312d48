/// Job orchestration module
///
/// Architecture:
/// - Domain: job entity, status machine and the metadata store trait
/// - Infrastructure: in-memory metadata store
/// - Registry: authoritative job state, mirrored to the store
/// - Worker / Scheduler: bounded pool that runs extraction jobs
pub mod domain;
pub mod infrastructure;
pub mod registry;
pub mod scheduler;
pub mod worker;

pub use domain::{CancelAck, Job, JobSnapshot, JobStatus, MetadataStore};
pub use infrastructure::InMemoryMetadataStore;
pub use registry::JobRegistry;
pub use scheduler::{PoolStatistics, Scheduler};
pub use worker::JobWorker;
