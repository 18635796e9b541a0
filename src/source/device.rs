use super::adapter::{CaptureResult, FrameClock, SourceAdapter};
use super::grabber::{BlockingGrabber, FrameGrabber, Grab};
use crate::error::CaptureError;
use crate::frame::BufferedFrame;
use async_trait::async_trait;
use tracing::{debug, info, trace, warn};

/// Local camera addressed by index.
///
/// Open failures are terminal for this instance; retrying is left to the
/// orchestrator or caller.
pub struct DeviceAdapter {
    index: u32,
    grabber: BlockingGrabber,
    clock: FrameClock,
}

impl DeviceAdapter {
    pub fn new<S: Into<String>>(source_id: S, index: u32, grabber: Box<dyn FrameGrabber>) -> Self {
        Self {
            index,
            grabber: BlockingGrabber::new(grabber),
            clock: FrameClock::new(source_id),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

#[async_trait]
impl SourceAdapter for DeviceAdapter {
    fn source_id(&self) -> &str {
        self.clock.source_id()
    }

    async fn open(&mut self) -> CaptureResult<()> {
        info!(
            "[{}] Opening camera device {}",
            self.source_id(),
            self.index
        );

        self.grabber.open().await.map_err(|e| CaptureError::Open {
            source_id: self.source_id().to_string(),
            details: format!("camera device {}: {}", self.index, e),
        })?;

        self.clock.reset();
        let (width, height) = self.grabber.resolution();
        info!(
            "[{}] Camera device {} opened ({}x{} @ {:.1}fps)",
            self.source_id(),
            self.index,
            width,
            height,
            self.grabber.nominal_fps()
        );
        Ok(())
    }

    async fn read(&mut self) -> CaptureResult<Option<BufferedFrame>> {
        if !self.grabber.is_open() {
            trace!("[{}] Read on closed device", self.source_id());
            return Ok(None);
        }

        match self.grabber.grab().await {
            Ok(Grab::Frame(image)) => Ok(Some(self.clock.stamp(image))),
            Ok(Grab::Miss) => Ok(None),
            Ok(Grab::EndOfStream) => {
                warn!(
                    "[{}] Camera device {} reported end of stream",
                    self.source_id(),
                    self.index
                );
                Ok(None)
            }
            Err(e) => Err(CaptureError::Read {
                source_id: self.source_id().to_string(),
                details: e.to_string(),
            }),
        }
    }

    async fn close(&mut self) {
        if self.grabber.is_open() {
            self.grabber.release().await;
            debug!("[{}] Camera device {} closed", self.source_id(), self.index);
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
        let applied = self
            .grabber
            .set_resolution(width, height)
            .await
            .map_err(|e| CaptureError::Read {
                source_id: self.source_id().to_string(),
                details: format!("camera device {}: {}", self.index, e),
            })?;

        if applied {
            info!(
                "[{}] Camera device {} resolution set to {}x{}",
                self.source_id(),
                self.index,
                width,
                height
            );
        } else {
            warn!(
                "[{}] Camera device {} did not accept {}x{}",
                self.source_id(),
                self.index,
                width,
                height
            );
        }
        Ok(applied)
    }
}
