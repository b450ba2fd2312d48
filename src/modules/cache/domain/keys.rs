//! Cache key scheme

use uuid::Uuid;

pub const RECENT_FRAMES_PREFIX: &str = "recent_frames:";

pub fn job_status_key(job_id: Uuid) -> String {
    format!("status:{}", job_id)
}

pub fn job_frames_key(job_id: Uuid) -> String {
    format!("frames:{}", job_id)
}

/// Windowed dashboard key, parameterized by the window and optional job filter
pub fn recent_frames_key(since_minutes: u32, job_id: Option<Uuid>) -> String {
    match job_id {
        Some(id) => format!("{}{}:{}", RECENT_FRAMES_PREFIX, since_minutes, id),
        None => format!("{}{}", RECENT_FRAMES_PREFIX, since_minutes),
    }
}
