// Shared kernel: errors, configuration and logging used by every module

pub mod config;
pub mod errors;
pub mod utils;

pub use config::{AdmissionPolicy, AppConfig};
pub use errors::{AppError, AppResult};
