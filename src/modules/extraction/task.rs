//! Frame sampling and deduplication for one job
//!
//! The task walks the source in presentation order, keeps every
//! `frame_step`-th frame, drops frames whose encoded bytes were already seen
//! in this job, and persists the rest. Decoding and encoding happen on the
//! blocking pool; registry updates and storage writes stay async.

use crate::modules::extraction::domain::{
    ExtractionOutcome, FrameMetadata, FrameSource, FrameSourceProvider, FrameStorage,
    SourceProperties,
};
use crate::modules::extraction::infrastructure::{encode_frame, EncodedFrame};
use crate::modules::jobs::domain::JobSnapshot;
use crate::modules::jobs::registry::JobRegistry;
use crate::shared::errors::{AppError, AppResult};
use crate::{log_debug, log_info};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Which frames a run keeps and how many it expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPlan {
    pub frame_step: u64,
    pub estimated_samples: u64,
}

impl SamplingPlan {
    pub fn new(properties: SourceProperties, interval_seconds: f64) -> AppResult<Self> {
        let SourceProperties {
            frame_rate,
            duration,
        } = properties;

        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(AppError::SourceError(format!(
                "Source reports invalid frame rate {}",
                frame_rate
            )));
        }
        if !interval_seconds.is_finite() || interval_seconds <= 0.0 {
            return Err(AppError::ValidationError(format!(
                "Invalid sampling interval {}",
                interval_seconds
            )));
        }

        let duration = if duration.is_finite() {
            duration.max(0.0)
        } else {
            0.0
        };

        Ok(Self {
            frame_step: ((frame_rate * interval_seconds).round() as u64).max(1),
            estimated_samples: ((duration / interval_seconds).floor() as u64).saturating_add(1),
        })
    }

    pub fn is_sampled(&self, frame_index: u64) -> bool {
        frame_index % self.frame_step == 0
    }
}

/// File name of a stored frame, sortable by sample position
pub fn frame_file_name(sample_index: u64, timestamp_seconds: f64) -> String {
    let timestamp_ms = (timestamp_seconds * 1000.0).round() as u64;
    format!("frame_{:06}_{:010}ms.jpg", sample_index, timestamp_ms)
}

struct SampledFrame {
    frame_index: u64,
    encoded: EncodedFrame,
}

/// Source plus read position, moved in and out of the blocking pool
struct Cursor {
    source: Box<dyn FrameSource>,
    position: u64,
    plan: SamplingPlan,
}

impl Cursor {
    /// Read ahead to the next sampled frame and encode it
    fn advance(&mut self) -> AppResult<Option<SampledFrame>> {
        loop {
            let Some(frame) = self.source.next_frame()? else {
                return Ok(None);
            };
            let frame_index = self.position;
            self.position += 1;

            if self.plan.is_sampled(frame_index) {
                let encoded = encode_frame(&frame)?;
                return Ok(Some(SampledFrame {
                    frame_index,
                    encoded,
                }));
            }
        }
    }
}

pub struct ExtractionTask {
    registry: Arc<JobRegistry>,
    provider: Arc<dyn FrameSourceProvider>,
    storage: Arc<dyn FrameStorage>,
}

impl ExtractionTask {
    pub fn new(
        registry: Arc<JobRegistry>,
        provider: Arc<dyn FrameSourceProvider>,
        storage: Arc<dyn FrameStorage>,
    ) -> Self {
        Self {
            registry,
            provider,
            storage,
        }
    }

    /// Extract frames for a job that is already Processing.
    ///
    /// Cancellation is checked after every sampled frame and yields
    /// `ExtractionOutcome::Cancelled`; nothing is written after that point.
    pub async fn run(
        &self,
        job: &JobSnapshot,
        cancel: &CancellationToken,
    ) -> AppResult<ExtractionOutcome> {
        if cancel.is_cancelled() {
            return Ok(ExtractionOutcome::Cancelled { sampled_frames: 0 });
        }

        let job_id = job.id;
        let mut cursor = self.open(&job.source, job.interval_seconds).await?;
        let plan = cursor.plan;
        let frame_rate = cursor.source.properties().frame_rate;

        log_info!(
            "Job {}: sampling every {} frames, about {} samples expected",
            job_id,
            plan.frame_step,
            plan.estimated_samples
        );
        self.registry
            .update_progress(job_id, 0, Some(plan.estimated_samples))
            .await?;

        let mut seen = HashSet::new();
        let mut sampled: u64 = 0;
        let mut stored: u64 = 0;

        loop {
            let (returned, next) = tokio::task::spawn_blocking(move || {
                let next = cursor.advance();
                (cursor, next)
            })
            .await?;
            cursor = returned;

            let Some(frame) = next? else {
                break;
            };

            let sample_index = sampled;
            sampled += 1;

            if seen.insert(frame.encoded.checksum.clone()) {
                self.persist(job_id, sample_index, frame_rate, frame).await?;
                stored += 1;
            } else {
                log_debug!(
                    "Job {}: frame {} duplicates an earlier frame, skipped",
                    job_id,
                    frame.frame_index
                );
            }

            self.registry.update_progress(job_id, sampled, None).await?;

            if cancel.is_cancelled() {
                log_info!("Job {}: stopping after {} sampled frames", job_id, sampled);
                return Ok(ExtractionOutcome::Cancelled {
                    sampled_frames: sampled,
                });
            }
        }

        self.registry
            .update_progress(job_id, sampled, Some(sampled))
            .await?;

        Ok(ExtractionOutcome::Completed {
            sampled_frames: sampled,
            stored_frames: stored,
        })
    }

    async fn open(&self, source: &str, interval_seconds: f64) -> AppResult<Cursor> {
        let provider = Arc::clone(&self.provider);
        let source = source.to_string();

        tokio::task::spawn_blocking(move || -> AppResult<Cursor> {
            let opened = provider.open(&source)?;
            let plan = SamplingPlan::new(opened.properties(), interval_seconds)?;
            Ok(Cursor {
                source: opened,
                position: 0,
                plan,
            })
        })
        .await?
    }

    async fn persist(
        &self,
        job_id: Uuid,
        sample_index: u64,
        frame_rate: f64,
        frame: SampledFrame,
    ) -> AppResult<()> {
        let timestamp_in_video = frame.frame_index as f64 / frame_rate;
        let file_name = frame_file_name(sample_index, timestamp_in_video);

        let written = self
            .storage
            .write_frame(job_id, &file_name, &frame.encoded.bytes)
            .await?;

        self.registry
            .record_frame(&FrameMetadata {
                id: Uuid::new_v4(),
                job_id,
                sample_index,
                timestamp_in_video,
                storage_path: written.path,
                size_bytes: written.size_bytes,
                content_checksum: frame.encoded.checksum,
                created_at: Utc::now(),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(frame_rate: f64, duration: f64) -> SourceProperties {
        SourceProperties {
            frame_rate,
            duration,
        }
    }

    #[test]
    fn test_plan_for_two_minute_clip() {
        let plan = SamplingPlan::new(props(30.0, 120.0), 5.0).unwrap();
        assert_eq!(plan.frame_step, 150);
        assert_eq!(plan.estimated_samples, 25);

        let sampled = (0..3600).filter(|i| plan.is_sampled(*i)).count();
        assert_eq!(sampled, 24);
    }

    #[test]
    fn test_interval_longer_than_clip_keeps_first_frame() {
        let plan = SamplingPlan::new(props(25.0, 2.0), 10.0).unwrap();
        let sampled: Vec<u64> = (0..50).filter(|i| plan.is_sampled(*i)).collect();
        assert_eq!(sampled, vec![0]);
        assert_eq!(plan.estimated_samples, 1);
    }

    #[test]
    fn test_zero_duration_estimates_one_sample() {
        let plan = SamplingPlan::new(props(30.0, 0.0), 1.0).unwrap();
        assert_eq!(plan.estimated_samples, 1);
        assert!(plan.is_sampled(0));
    }

    #[test]
    fn test_step_clamped_to_one() {
        let plan = SamplingPlan::new(props(2.0, 10.0), 0.1).unwrap();
        assert_eq!(plan.frame_step, 1);
    }

    #[test]
    fn test_tiny_interval_saturates_estimate() {
        let plan = SamplingPlan::new(props(30.0, 10.0), 1e-300).unwrap();
        assert_eq!(plan.frame_step, 1);
        assert_eq!(plan.estimated_samples, u64::MAX);
    }

    #[test]
    fn test_invalid_frame_rate_is_source_error() {
        for rate in [0.0, -24.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                SamplingPlan::new(props(rate, 10.0), 1.0),
                Err(AppError::SourceError(_))
            ));
        }
    }

    #[test]
    fn test_file_name_layout() {
        assert_eq!(frame_file_name(3, 15.0), "frame_000003_0000015000ms.jpg");
        assert_eq!(frame_file_name(0, 0.0), "frame_000000_0000000000ms.jpg");
    }
}
