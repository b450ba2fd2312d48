use log::{debug, info, warn};
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize the logging system
/// This should be called once at application startup
pub fn init_logger() {
    INIT.call_once(|| {
        let result = env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info) // Default level
            .filter_module("frame_jobs_lib", log::LevelFilter::Debug)
            .filter_module("redis", log::LevelFilter::Warn)
            .filter_module("tokio", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .format_target(false)
            .format_module_path(false)
            .try_init();

        // An embedding application may already own the global logger.
        if result.is_ok() {
            info!("Logging system initialized");
        }
    });
}

/// Macro for structured logging with context
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        log::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        log::debug!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        log::warn!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        log::error!($($arg)*)
    };
}

/// Structured logging helpers for common patterns
pub struct LogContext;

impl LogContext {
    /// Log job lifecycle transitions
    pub fn job_transition(job_id: &uuid::Uuid, from: &str, to: &str) {
        info!("Job {}: {} -> {}", job_id, from, to);
    }

    /// Log extraction progress
    pub fn extraction_progress(job_id: &uuid::Uuid, processed: u64, total: Option<u64>) {
        match total {
            Some(total) => debug!("Job {}: [{}/{}] frames sampled", job_id, processed, total),
            None => debug!("Job {}: {} frames sampled", job_id, processed),
        }
    }

    /// Log metadata store operations
    pub fn store_operation(operation: &str, target: &str, duration_ms: Option<u64>) {
        match duration_ms {
            Some(duration) => debug!("Store: {} on {} completed in {}ms", operation, target, duration),
            None => debug!("Store: Starting {} on {}", operation, target),
        }
    }

    /// Log errors with context
    pub fn error_with_context(error: &dyn std::error::Error, context: &str) {
        warn!("{}: {}", context, error);
    }

    /// Log performance metrics
    pub fn performance_metric(operation: &str, duration_ms: u64, additional_info: Option<&str>) {
        match additional_info {
            Some(info) => info!(
                "Performance: {} took {}ms ({})",
                operation, duration_ms, info
            ),
            None => info!("Performance: {} took {}ms", operation, duration_ms),
        }
    }
}

/// Helper for timing operations
pub struct TimedOperation {
    start: std::time::Instant,
    operation: String,
}

impl TimedOperation {
    pub fn new(operation: &str) -> Self {
        debug!("Starting: {}", operation);
        Self {
            start: std::time::Instant::now(),
            operation: operation.to_string(),
        }
    }

    pub fn finish(self) -> u64 {
        let duration = self.start.elapsed().as_millis() as u64;
        LogContext::performance_metric(&self.operation, duration, None);
        duration
    }

    pub fn finish_with_info(self, info: &str) -> u64 {
        let duration = self.start.elapsed().as_millis() as u64;
        LogContext::performance_metric(&self.operation, duration, Some(info));
        duration
    }
}
