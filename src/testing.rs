//! Scripted collaborators shared by unit tests.

use crate::error::{CaptureError, InferenceError};
use crate::frame::BufferedFrame;
use crate::pipeline::{
    DensityEstimator, InferenceResult, InputTensor, PreprocessInfo, Preprocessor, Sizing,
};
use crate::source::{CaptureResult, FrameClock, FrameGrabber, Grab, SourceAdapter};
use crate::surface::DensitySurface;
use async_trait::async_trait;
use image::{Luma, RgbImage};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const TEST_FRAME_SIZE: (u32, u32) = (8, 6);

pub fn test_image() -> RgbImage {
    RgbImage::new(TEST_FRAME_SIZE.0, TEST_FRAME_SIZE.1)
}

/// Call counters observable after the scripted object has been boxed
#[derive(Debug, Default)]
pub struct Probe {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub reads: AtomicUsize,
    pub rewinds: AtomicUsize,
}

impl Probe {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
    pub fn rewinds(&self) -> usize {
        self.rewinds.load(Ordering::SeqCst)
    }
}

/// Grabber that replays a fixed script of outcomes.
pub struct ScriptedGrabber {
    open_results: VecDeque<Result<(), CaptureError>>,
    grabs: VecDeque<Result<Grab, CaptureError>>,
    replay: Option<Vec<Result<Grab, CaptureError>>>,
    when_empty: Grab,
    grab_delay: Duration,
    duration: Option<Duration>,
    open: bool,
    probe: Arc<Probe>,
}

impl ScriptedGrabber {
    pub fn new(grabs: Vec<Result<Grab, CaptureError>>) -> Self {
        Self {
            open_results: VecDeque::new(),
            grabs: grabs.into(),
            replay: None,
            when_empty: Grab::Miss,
            grab_delay: Duration::ZERO,
            duration: None,
            open: false,
            probe: Arc::new(Probe::default()),
        }
    }

    /// Results returned by successive `open` calls; `Ok` once exhausted
    pub fn with_opens(mut self, opens: Vec<Result<(), CaptureError>>) -> Self {
        self.open_results = opens.into();
        self
    }

    /// Reload the original script on every rewind
    pub fn replaying(mut self) -> Self {
        self.replay = Some(self.grabs.iter().cloned().collect());
        self
    }

    pub fn ending(mut self) -> Self {
        self.when_empty = Grab::EndOfStream;
        self
    }

    /// Block the calling thread in every grab, like a backend pull timeout
    pub fn with_grab_delay(mut self, delay: Duration) -> Self {
        self.grab_delay = delay;
        self
    }

    /// Report a finite stream length
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn probe(&self) -> Arc<Probe> {
        self.probe.clone()
    }

    pub fn frame() -> Result<Grab, CaptureError> {
        Ok(Grab::Frame(test_image()))
    }

    pub fn miss() -> Result<Grab, CaptureError> {
        Ok(Grab::Miss)
    }

    pub fn end() -> Result<Grab, CaptureError> {
        Ok(Grab::EndOfStream)
    }

    pub fn fault(details: &str) -> Result<Grab, CaptureError> {
        Err(CaptureError::Backend {
            details: details.to_string(),
        })
    }
}

impl FrameGrabber for ScriptedGrabber {
    fn open(&mut self) -> Result<(), CaptureError> {
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        self.open_results.pop_front().unwrap_or(Ok(()))?;
        self.open = true;
        Ok(())
    }

    fn grab(&mut self) -> Result<Grab, CaptureError> {
        self.probe.reads.fetch_add(1, Ordering::SeqCst);
        if !self.grab_delay.is_zero() {
            std::thread::sleep(self.grab_delay);
        }
        self.grabs
            .pop_front()
            .unwrap_or_else(|| Ok(self.when_empty.clone()))
    }

    fn rewind(&mut self) -> Result<(), CaptureError> {
        self.probe.rewinds.fetch_add(1, Ordering::SeqCst);
        if let Some(replay) = &self.replay {
            self.grabs = replay.iter().cloned().collect();
        }
        Ok(())
    }

    fn release(&mut self) {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn resolution(&self) -> (u32, u32) {
        TEST_FRAME_SIZE
    }

    fn nominal_fps(&self) -> f64 {
        30.0
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }
}

/// One scripted adapter read
#[derive(Debug, Clone)]
pub enum Step {
    Frame,
    Miss,
    Fault(String),
    /// Never returns, like a read stuck on a dead socket
    Hang,
}

/// Adapter that bypasses grabbers entirely, for worker and orchestrator tests.
pub struct ScriptedAdapter {
    clock: FrameClock,
    open_error: Option<CaptureError>,
    open_delay: Duration,
    steps: VecDeque<Step>,
    repeat: Step,
    frame_delay: Duration,
    open: bool,
    probe: Arc<Probe>,
}

impl ScriptedAdapter {
    /// Adapter producing frames forever, paced by `frame_delay`
    pub fn streaming(source_id: &str, frame_delay: Duration) -> Self {
        Self {
            clock: FrameClock::new(source_id),
            open_error: None,
            open_delay: Duration::ZERO,
            steps: VecDeque::new(),
            repeat: Step::Frame,
            frame_delay,
            open: false,
            probe: Arc::new(Probe::default()),
        }
    }

    pub fn failing_open(source_id: &str) -> Self {
        let mut adapter = Self::streaming(source_id, Duration::ZERO);
        adapter.open_error = Some(CaptureError::Open {
            source_id: source_id.to_string(),
            details: "device unavailable".to_string(),
        });
        adapter
    }

    /// Play `steps` once, then repeat `then` forever
    pub fn scripted(source_id: &str, steps: Vec<Step>, then: Step) -> Self {
        let mut adapter = Self::streaming(source_id, Duration::from_millis(1));
        adapter.steps = steps.into();
        adapter.repeat = then;
        adapter
    }

    /// Delay every `open`, like a backend slow to reach its playing state
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn probe(&self) -> Arc<Probe> {
        self.probe.clone()
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    fn source_id(&self) -> &str {
        self.clock.source_id()
    }

    async fn open(&mut self) -> CaptureResult<()> {
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        if let Some(err) = self.open_error.clone() {
            return Err(err);
        }
        self.open = true;
        self.clock.reset();
        Ok(())
    }

    async fn read(&mut self) -> CaptureResult<Option<BufferedFrame>> {
        self.probe.reads.fetch_add(1, Ordering::SeqCst);
        if !self.open {
            return Ok(None);
        }

        let step = self.steps.pop_front().unwrap_or_else(|| self.repeat.clone());
        match step {
            Step::Frame => {
                if !self.frame_delay.is_zero() {
                    tokio::time::sleep(self.frame_delay).await;
                }
                Ok(Some(self.clock.stamp(test_image())))
            }
            Step::Miss => Ok(None),
            Step::Fault(details) => Err(CaptureError::Read {
                source_id: self.source_id().to_string(),
                details,
            }),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn resolution(&self) -> (u32, u32) {
        TEST_FRAME_SIZE
    }

    fn fps(&self) -> f64 {
        30.0
    }

    fn measured_fps(&self) -> f64 {
        self.clock.fps()
    }
}

/// Preprocessor that records the frame shape and passes an empty tensor on
#[derive(Debug, Default)]
pub struct FakePreprocessor {
    pub fail: bool,
}

impl Preprocessor for FakePreprocessor {
    fn preprocess(
        &self,
        frame: &RgbImage,
        _sizing: Sizing,
    ) -> InferenceResult<(InputTensor, PreprocessInfo)> {
        if self.fail {
            return Err(InferenceError::Preprocess {
                details: "scripted failure".to_string(),
            });
        }

        let shape = (frame.height(), frame.width());
        Ok((
            InputTensor {
                channels: 3,
                height: frame.height(),
                width: frame.width(),
                data: Vec::new(),
            },
            PreprocessInfo {
                original_shape: shape,
                processed_shape: shape,
                scale_h: 1.0,
                scale_w: 1.0,
            },
        ))
    }
}

/// Estimator returning uniform 2x2 surfaces summing to scripted counts.
pub struct FakeEstimator {
    counts: Mutex<VecDeque<f64>>,
    surface: Option<DensitySurface>,
    fail: bool,
}

impl FakeEstimator {
    pub fn with_counts(counts: Vec<f64>) -> Self {
        Self {
            counts: Mutex::new(counts.into()),
            surface: None,
            fail: false,
        }
    }

    /// Always return this surface
    pub fn with_surface(surface: DensitySurface) -> Self {
        Self {
            counts: Mutex::new(VecDeque::new()),
            surface: Some(surface),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            counts: Mutex::new(VecDeque::new()),
            surface: None,
            fail: true,
        }
    }
}

impl DensityEstimator for FakeEstimator {
    fn estimate(&self, _input: &InputTensor) -> InferenceResult<DensitySurface> {
        if self.fail {
            return Err(InferenceError::Estimator {
                details: "scripted failure".to_string(),
            });
        }
        if let Some(surface) = &self.surface {
            return Ok(surface.clone());
        }

        let count = self.counts.lock().pop_front().unwrap_or(0.0);
        Ok(DensitySurface::from_pixel(2, 2, Luma([(count / 4.0) as f32])))
    }

    fn name(&self) -> &str {
        "fake"
    }
}
