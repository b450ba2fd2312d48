/// Synthetic frame sources for integration tests
///
/// Sources are described by a `SourceSpec` builder and registered on a
/// `SyntheticProvider` under a name, which is then used as the job source.
use frame_jobs_lib::modules::extraction::{
    FrameSource, FrameSourceProvider, SourceProperties, VideoFrame,
};
use frame_jobs_lib::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const FRAME_SIZE: u32 = 16;

/// Colour of frame `index`; distinct for the first 512 indices
pub fn distinct_color(index: u64) -> [u8; 3] {
    [
        ((index % 8) * 32) as u8,
        (((index / 8) % 8) * 32) as u8,
        (((index / 64) % 8) * 32) as u8,
    ]
}

#[derive(Debug, Clone)]
pub struct SourceSpec {
    frame_rate: f64,
    duration: f64,
    frame_count: u64,
    duplicates: bool,
    delay: Option<Duration>,
    fail_at: Option<u64>,
    panic_at: Option<u64>,
}

impl SourceSpec {
    /// A clip with `frame_rate * duration` distinct frames
    pub fn clip(frame_rate: f64, duration: f64) -> Self {
        Self {
            frame_rate,
            duration,
            frame_count: (frame_rate * duration).round() as u64,
            duplicates: false,
            delay: None,
            fail_at: None,
            panic_at: None,
        }
    }

    pub fn with_frame_count(mut self, frame_count: u64) -> Self {
        self.frame_count = frame_count;
        self
    }

    /// Every frame has identical content
    pub fn all_duplicates(mut self) -> Self {
        self.duplicates = true;
        self
    }

    /// Sleep this long before yielding each frame
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing_at(mut self, index: u64) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn panicking_at(mut self, index: u64) -> Self {
        self.panic_at = Some(index);
        self
    }
}

/// Tracks how many sources are open at once
#[derive(Debug, Default)]
pub struct OpenGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
    opened: AtomicUsize,
}

impl OpenGauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

pub struct SyntheticSource {
    spec: SourceSpec,
    position: u64,
    gauge: Arc<OpenGauge>,
}

impl FrameSource for SyntheticSource {
    fn properties(&self) -> SourceProperties {
        SourceProperties {
            frame_rate: self.spec.frame_rate,
            duration: self.spec.duration,
        }
    }

    fn next_frame(&mut self) -> AppResult<Option<VideoFrame>> {
        let index = self.position;
        if index >= self.spec.frame_count {
            return Ok(None);
        }
        self.position += 1;

        if let Some(delay) = self.spec.delay {
            std::thread::sleep(delay);
        }
        if self.spec.fail_at == Some(index) {
            return Err(AppError::SourceError(format!(
                "Corrupt frame at index {}",
                index
            )));
        }
        if self.spec.panic_at == Some(index) {
            panic!("decoder crashed at frame {}", index);
        }

        let color = if self.spec.duplicates {
            [90, 120, 200]
        } else {
            distinct_color(index)
        };
        Ok(Some(VideoFrame::solid(FRAME_SIZE, FRAME_SIZE, color)))
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.gauge.exit();
    }
}

/// Provider serving registered synthetic sources by name
#[derive(Default)]
pub struct SyntheticProvider {
    specs: Mutex<HashMap<String, SourceSpec>>,
    gauge: Arc<OpenGauge>,
}

impl SyntheticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, spec: SourceSpec) {
        self.specs.lock().unwrap().insert(name.to_string(), spec);
    }

    pub fn gauge(&self) -> &Arc<OpenGauge> {
        &self.gauge
    }
}

impl FrameSourceProvider for SyntheticProvider {
    fn open(&self, source: &str) -> AppResult<Box<dyn FrameSource>> {
        let spec = self
            .specs
            .lock()
            .unwrap()
            .get(source)
            .cloned()
            .ok_or_else(|| AppError::SourceError(format!("Cannot open {}", source)))?;

        self.gauge.enter();
        Ok(Box::new(SyntheticSource {
            spec,
            position: 0,
            gauge: Arc::clone(&self.gauge),
        }))
    }
}
