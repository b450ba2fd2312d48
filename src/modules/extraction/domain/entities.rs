use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata row for one persisted (non-duplicate) sampled frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub id: Uuid,
    pub job_id: Uuid,
    /// Position of the frame among the job's sampled frames
    pub sample_index: u64,
    /// Seconds from the start of the video
    pub timestamp_in_video: f64,
    pub storage_path: String,
    pub size_bytes: u64,
    pub content_checksum: String,
    pub created_at: DateTime<Utc>,
}

/// Decoded frame as handed over by a frame source (RGB8, row-major)
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    /// Uniformly coloured frame, handy for synthetic sources
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(rgb_len(width, height).unwrap_or(0))
            .collect();
        Self::new(width, height, data)
    }

    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Buffer length an RGB8 frame of this size needs, `None` if it does not
    /// fit in memory
    pub fn expected_len(&self) -> Option<usize> {
        rgb_len(self.width, self.height)
    }
}

fn rgb_len(width: u32, height: u32) -> Option<usize> {
    usize::try_from(width)
        .ok()?
        .checked_mul(usize::try_from(height).ok()?)?
        .checked_mul(3)
}

/// Properties reported by an opened source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceProperties {
    pub frame_rate: f64,
    /// Seconds
    pub duration: f64,
}

/// Result of writing one encoded frame to storage
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFrame {
    pub path: String,
    pub size_bytes: u64,
}

/// How an extraction run ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Completed {
        sampled_frames: u64,
        stored_frames: u64,
    },
    Cancelled {
        sampled_frames: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_frame_layout() {
        let frame = VideoFrame::solid(4, 2, [10, 20, 30]);
        assert_eq!(frame.pixel_count(), 8);
        assert_eq!(frame.data.len(), 24);
        assert_eq!(&frame.data[..6], &[10, 20, 30, 10, 20, 30]);
    }

    #[test]
    fn test_large_dimensions_do_not_wrap() {
        let frame = VideoFrame::new(100_000, 100_000, Vec::new());
        assert_eq!(frame.pixel_count(), 10_000_000_000);

        let frame = VideoFrame::new(u32::MAX, u32::MAX, Vec::new());
        assert_eq!(frame.pixel_count(), u64::from(u32::MAX) * u64::from(u32::MAX));
        assert_eq!(frame.expected_len(), None);
    }
}
