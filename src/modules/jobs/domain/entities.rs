/// Domain entities for frame extraction jobs
///
/// A job tracks one video's extraction request from submission to a single
/// terminal state. The transition table lives on `JobStatus`.
use crate::shared::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Central transition table. Terminal states have no exits and no state
    /// is ever revisited.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Cancelled)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

/// Job record, also used as the read-only snapshot handed to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub source: String,
    pub interval_seconds: f64,
    pub total_frames: Option<u64>,
    pub processed_frames: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error_message: Option<String>,
    pub cancel_requested: bool,
}

/// Point-in-time copy of a job returned by status queries
pub type JobSnapshot = Job;

impl Job {
    /// Create a new pending job after validating the submission
    pub fn new(source: &str, interval_seconds: f64) -> AppResult<Self> {
        let source = source.trim();
        if source.is_empty() {
            return Err(AppError::ValidationError(
                "Video source must not be empty".to_string(),
            ));
        }
        if !interval_seconds.is_finite() || interval_seconds <= 0.0 {
            return Err(AppError::ValidationError(format!(
                "Sampling interval must be a positive number of seconds, got {}",
                interval_seconds
            )));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            source: source.to_string(),
            interval_seconds,
            total_frames: None,
            processed_frames: 0,
            created_at: now,
            updated_at: now,
            error_message: None,
            cancel_requested: false,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `next`, enforcing the transition table
    pub fn transition_to(&mut self, next: JobStatus) -> AppResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "Job {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Apply a progress report. `processed_frames` never regresses and
    /// `total_frames` is raised when an estimate turns out too low.
    pub fn apply_progress(&mut self, processed: u64, total: Option<u64>) {
        self.processed_frames = self.processed_frames.max(processed);
        if let Some(total) = total {
            self.total_frames = Some(total);
        }
        if let Some(total) = self.total_frames {
            if self.processed_frames > total {
                self.total_frames = Some(self.processed_frames);
            }
        }
        self.updated_at = Utc::now();
    }
}

/// Acknowledgement returned by a cancellation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelAck {
    pub job_id: Uuid,
    /// Status right after the request; `Processing` means the stop is
    /// still in flight
    pub status: JobStatus,
}
