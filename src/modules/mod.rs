pub mod cache;
pub mod dashboard;
pub mod extraction;
pub mod jobs;
