use crate::error::CaptureError;
use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Outcome of a single grab attempt
#[derive(Debug, Clone)]
pub enum Grab {
    Frame(RgbImage),
    /// Nothing available yet; try again shortly
    Miss,
    /// The stream has ended (file finished, remote hung up)
    EndOfStream,
}

/// Low-level frame producer underneath a source adapter.
///
/// Grabbers know how to talk to a backend; adapters layer sequencing, rate
/// measurement, reconnection and looping on top.
pub trait FrameGrabber: Send {
    fn open(&mut self) -> Result<(), CaptureError>;
    fn grab(&mut self) -> Result<Grab, CaptureError>;
    /// Seek back to the first frame
    fn rewind(&mut self) -> Result<(), CaptureError>;
    fn release(&mut self);
    fn is_open(&self) -> bool;
    fn resolution(&self) -> (u32, u32);
    /// Rate advertised by the backend, 0.0 when unknown
    fn nominal_fps(&self) -> f64;

    /// Length of a finite stream, `None` for live feeds or when unknown
    fn duration(&self) -> Option<Duration> {
        None
    }

    /// Request a new output resolution. Returns whether the backend now
    /// delivers exactly `width`x`height`.
    fn set_resolution(&mut self, _width: u32, _height: u32) -> Result<bool, CaptureError> {
        Ok(false)
    }
}

/// Backend facts cached after every blocking call so adapters can answer
/// introspection queries without waiting on the backend lock.
#[derive(Debug, Clone, Copy, Default)]
struct GrabberState {
    open: bool,
    resolution: (u32, u32),
    fps: f64,
    duration: Option<Duration>,
}

impl GrabberState {
    fn of(grabber: &dyn FrameGrabber) -> Self {
        Self {
            open: grabber.is_open(),
            resolution: grabber.resolution(),
            fps: grabber.nominal_fps(),
            duration: grabber.duration(),
        }
    }
}

/// Runs a [`FrameGrabber`] on the blocking thread pool.
///
/// Backend calls can block for hundreds of milliseconds (pipeline start,
/// sample pulls), so every call goes through `spawn_blocking` and the async
/// runtime threads stay free. A call abandoned by its caller still runs to
/// completion; the next call waits for it on the grabber lock.
pub struct BlockingGrabber {
    inner: Arc<Mutex<Box<dyn FrameGrabber>>>,
    state: GrabberState,
}

impl BlockingGrabber {
    pub fn new(grabber: Box<dyn FrameGrabber>) -> Self {
        let state = GrabberState::of(&*grabber);
        Self {
            inner: Arc::new(Mutex::new(grabber)),
            state,
        }
    }

    async fn call<T, F>(&mut self, op: F) -> Result<T, CaptureError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn FrameGrabber) -> Result<T, CaptureError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let (result, state) = tokio::task::spawn_blocking(move || {
            let mut grabber = inner.lock();
            let result = op(&mut **grabber);
            (result, GrabberState::of(&**grabber))
        })
        .await
        .map_err(|e| CaptureError::Backend {
            details: format!("Grabber task failed: {}", e),
        })?;

        self.state = state;
        result
    }

    pub async fn open(&mut self) -> Result<(), CaptureError> {
        self.call(|grabber| grabber.open()).await
    }

    pub async fn grab(&mut self) -> Result<Grab, CaptureError> {
        self.call(|grabber| grabber.grab()).await
    }

    pub async fn rewind(&mut self) -> Result<(), CaptureError> {
        self.call(|grabber| grabber.rewind()).await
    }

    pub async fn release(&mut self) {
        let _ = self
            .call(|grabber| {
                grabber.release();
                Ok(())
            })
            .await;
        self.state.open = false;
    }

    pub async fn set_resolution(&mut self, width: u32, height: u32) -> Result<bool, CaptureError> {
        self.call(move |grabber| grabber.set_resolution(width, height))
            .await
    }

    pub fn is_open(&self) -> bool {
        self.state.open
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.state.resolution
    }

    pub fn nominal_fps(&self) -> f64 {
        self.state.fps
    }

    pub fn duration(&self) -> Option<Duration> {
        self.state.duration
    }
}

/// Pattern generator used when no hardware backend is compiled in.
///
/// Frames are paced at the configured rate; grabbing early yields `Miss`.
pub struct SyntheticGrabber {
    width: u32,
    height: u32,
    fps: f64,
    frame_limit: Option<u64>,
    produced: u64,
    last_frame: Option<Instant>,
    open: bool,
}

impl SyntheticGrabber {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            fps,
            frame_limit: None,
            produced: 0,
            last_frame: None,
            open: false,
        }
    }

    /// End the stream after `limit` frames, like a recorded file would
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    fn frame_interval(&self) -> Duration {
        if self.fps > 0.0 {
            Duration::from_secs_f64(1.0 / self.fps)
        } else {
            Duration::ZERO
        }
    }

    fn render(&self) -> RgbImage {
        let shade = (self.produced % 256) as u8;
        let color = Rgb([shade, 128u8, 255 - shade]);
        RgbImage::from_pixel(self.width, self.height, color)
    }
}

impl FrameGrabber for SyntheticGrabber {
    fn open(&mut self) -> Result<(), CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::Backend {
                details: format!(
                    "Synthetic resolution {}x{} is invalid",
                    self.width, self.height
                ),
            });
        }

        debug!(
            "Synthetic grabber opened ({}x{} @ {:.1}fps)",
            self.width, self.height, self.fps
        );
        self.open = true;
        self.produced = 0;
        self.last_frame = None;
        Ok(())
    }

    fn grab(&mut self) -> Result<Grab, CaptureError> {
        if !self.open {
            return Ok(Grab::Miss);
        }

        if let Some(limit) = self.frame_limit {
            if self.produced >= limit {
                return Ok(Grab::EndOfStream);
            }
        }

        if let Some(last) = self.last_frame {
            if last.elapsed() < self.frame_interval() {
                return Ok(Grab::Miss);
            }
        }

        let frame = self.render();
        self.produced += 1;
        self.last_frame = Some(Instant::now());
        trace!("Generated synthetic frame {}", self.produced);
        Ok(Grab::Frame(frame))
    }

    fn rewind(&mut self) -> Result<(), CaptureError> {
        self.produced = 0;
        self.last_frame = None;
        Ok(())
    }

    fn release(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn nominal_fps(&self) -> f64 {
        self.fps
    }

    fn duration(&self) -> Option<Duration> {
        match self.frame_limit {
            Some(limit) if self.fps > 0.0 => Some(Duration::from_secs_f64(limit as f64 / self.fps)),
            _ => None,
        }
    }

    fn set_resolution(&mut self, width: u32, height: u32) -> Result<bool, CaptureError> {
        if width == 0 || height == 0 {
            return Ok(false);
        }
        self.width = width;
        self.height = height;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_grabber_requires_open() {
        let mut grabber = SyntheticGrabber::new(16, 8, 0.0);
        assert!(matches!(grabber.grab().unwrap(), Grab::Miss));

        grabber.open().unwrap();
        match grabber.grab().unwrap() {
            Grab::Frame(image) => assert_eq!(image.dimensions(), (16, 8)),
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_synthetic_grabber_frame_limit_and_rewind() {
        let mut grabber = SyntheticGrabber::new(4, 4, 0.0).with_frame_limit(2);
        grabber.open().unwrap();

        assert!(matches!(grabber.grab().unwrap(), Grab::Frame(_)));
        assert!(matches!(grabber.grab().unwrap(), Grab::Frame(_)));
        assert!(matches!(grabber.grab().unwrap(), Grab::EndOfStream));

        grabber.rewind().unwrap();
        assert!(matches!(grabber.grab().unwrap(), Grab::Frame(_)));
    }

    #[test]
    fn test_synthetic_grabber_paces_frames() {
        let mut grabber = SyntheticGrabber::new(4, 4, 1.0);
        grabber.open().unwrap();

        assert!(matches!(grabber.grab().unwrap(), Grab::Frame(_)));
        assert!(matches!(grabber.grab().unwrap(), Grab::Miss));
    }

    #[test]
    fn test_synthetic_grabber_resolution_and_duration() {
        let mut grabber = SyntheticGrabber::new(4, 4, 25.0).with_frame_limit(50);
        assert_eq!(grabber.duration(), Some(Duration::from_secs(2)));
        assert_eq!(SyntheticGrabber::new(4, 4, 25.0).duration(), None);

        assert!(grabber.set_resolution(32, 24).unwrap());
        assert!(!grabber.set_resolution(0, 24).unwrap());
        grabber.open().unwrap();
        match grabber.grab().unwrap() {
            Grab::Frame(image) => assert_eq!(image.dimensions(), (32, 24)),
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blocking_grabber_caches_backend_state() {
        let mut grabber = BlockingGrabber::new(Box::new(SyntheticGrabber::new(16, 8, 10.0)));
        assert!(!grabber.is_open());

        grabber.open().await.unwrap();
        assert!(grabber.is_open());
        assert_eq!(grabber.resolution(), (16, 8));
        assert_eq!(grabber.nominal_fps(), 10.0);
        assert!(matches!(grabber.grab().await.unwrap(), Grab::Frame(_)));

        assert!(grabber.set_resolution(8, 4).await.unwrap());
        assert_eq!(grabber.resolution(), (8, 4));

        grabber.release().await;
        assert!(!grabber.is_open());
    }

    #[test]
    fn test_invalid_resolution_fails_open() {
        let mut grabber = SyntheticGrabber::new(0, 4, 30.0);
        assert!(grabber.open().is_err());
        assert!(!grabber.is_open());
    }
}
