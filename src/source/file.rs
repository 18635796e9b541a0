use super::adapter::{CaptureResult, FrameClock, SourceAdapter};
use super::grabber::{BlockingGrabber, FrameGrabber, Grab};
use crate::error::CaptureError;
use crate::frame::BufferedFrame;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Recorded video file, optionally looping.
///
/// In loop mode an end of stream seeks back to the first frame and resets
/// the sequence counter and rate estimate instead of ending.
pub struct FileAdapter {
    path: PathBuf,
    looping: bool,
    grabber: BlockingGrabber,
    clock: FrameClock,
    loops: u64,
    finished: bool,
}

impl FileAdapter {
    pub fn new<S: Into<String>, P: AsRef<Path>>(
        source_id: S,
        path: P,
        looping: bool,
        grabber: Box<dyn FrameGrabber>,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            looping,
            grabber: BlockingGrabber::new(grabber),
            clock: FrameClock::new(source_id),
            loops: 0,
            finished: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of times playback has wrapped back to the first frame.
    /// Consumers compare this across reads to detect discontinuities.
    pub fn loop_count(&self) -> u64 {
        self.loops
    }

    /// True once a non-looping file has played to the end
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Playing time of the file, once the backend knows it
    pub fn duration(&self) -> Option<Duration> {
        self.grabber.duration()
    }

    /// Frame count derived from duration and advertised rate, 0 when either
    /// is unknown
    pub fn total_frames(&self) -> u64 {
        let fps = self.grabber.nominal_fps();
        match self.grabber.duration() {
            Some(duration) if fps > 0.0 => (duration.as_secs_f64() * fps).round() as u64,
            _ => 0,
        }
    }

    fn read_error(&self, e: CaptureError) -> CaptureError {
        CaptureError::Read {
            source_id: self.source_id().to_string(),
            details: e.to_string(),
        }
    }

    async fn restart(&mut self) -> CaptureResult<Option<BufferedFrame>> {
        self.grabber.rewind().await.map_err(|e| self.read_error(e))?;
        self.clock.reset();
        self.loops += 1;
        debug!(
            "[{}] Looped {} back to the first frame (loop {})",
            self.source_id(),
            self.path.display(),
            self.loops
        );

        match self.grabber.grab().await.map_err(|e| self.read_error(e))? {
            Grab::Frame(image) => Ok(Some(self.clock.stamp(image))),
            Grab::Miss | Grab::EndOfStream => Ok(None),
        }
    }
}

#[async_trait]
impl SourceAdapter for FileAdapter {
    fn source_id(&self) -> &str {
        self.clock.source_id()
    }

    async fn open(&mut self) -> CaptureResult<()> {
        if !self.path.exists() {
            return Err(CaptureError::FileNotFound {
                path: self.path.display().to_string(),
            });
        }

        info!(
            "[{}] Opening video file: {}",
            self.source_id(),
            self.path.display()
        );

        self.grabber.open().await.map_err(|e| CaptureError::Open {
            source_id: self.source_id().to_string(),
            details: format!("{}: {}", self.path.display(), e),
        })?;

        self.clock.reset();
        self.finished = false;
        Ok(())
    }

    async fn read(&mut self) -> CaptureResult<Option<BufferedFrame>> {
        if !self.grabber.is_open() || self.finished {
            return Ok(None);
        }

        match self.grabber.grab().await.map_err(|e| self.read_error(e))? {
            Grab::Frame(image) => Ok(Some(self.clock.stamp(image))),
            Grab::Miss => Ok(None),
            Grab::EndOfStream if self.looping => self.restart().await,
            Grab::EndOfStream => {
                info!(
                    "[{}] Reached end of {}",
                    self.source_id(),
                    self.path.display()
                );
                self.finished = true;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) {
        if self.grabber.is_open() {
            self.grabber.release().await;
            debug!("[{}] Video file closed", self.source_id());
        }
    }

    fn is_open(&self) -> bool {
        self.grabber.is_open()
    }

    fn resolution(&self) -> (u32, u32) {
        self.grabber.resolution()
    }

    fn fps(&self) -> f64 {
        self.grabber.nominal_fps()
    }

    fn measured_fps(&self) -> f64 {
        self.clock.fps()
    }

    async fn set_resolution(&mut self, width: u32, height: u32) -> CaptureResult<bool> {
        self.grabber
            .set_resolution(width, height)
            .await
            .map_err(|e| self.read_error(e))
    }
}
