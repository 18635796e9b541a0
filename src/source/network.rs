use super::adapter::{CaptureResult, FrameClock, SourceAdapter};
use super::descriptor::mask_credentials;
use super::grabber::{BlockingGrabber, FrameGrabber, Grab};
use crate::error::CaptureError;
use crate::frame::BufferedFrame;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// URL-addressed stream (RTSP/RTMP/HTTP) with bounded reconnection.
///
/// A failed read on an open stream (fault or end of stream) triggers up to
/// `reconnect_attempts` cycles of close, delay, reopen, re-read. When the
/// budget runs out the fault is surfaced once and the adapter stays closed,
/// so later reads are plain misses until the worker is restarted.
pub struct NetworkAdapter {
    url: String,
    masked_url: String,
    grabber: BlockingGrabber,
    clock: FrameClock,
    reconnect_attempts: u32,
    reconnect_delay: Duration,
    reconnects: u64,
}

impl NetworkAdapter {
    pub fn new<S: Into<String>>(
        source_id: S,
        url: &str,
        grabber: Box<dyn FrameGrabber>,
        reconnect_attempts: u32,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            url: url.to_string(),
            masked_url: mask_credentials(url),
            grabber: BlockingGrabber::new(grabber),
            clock: FrameClock::new(source_id),
            reconnect_attempts,
            reconnect_delay,
            reconnects: 0,
        }
    }

    /// URL with credentials masked, safe for logs
    pub fn display_url(&self) -> &str {
        &self.masked_url
    }

    /// Successful reconnections since construction
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects
    }

    async fn open_inner(&mut self) -> CaptureResult<()> {
        self.grabber.open().await.map_err(|e| CaptureError::Open {
            source_id: self.source_id().to_string(),
            details: format!(
                "stream {}: {}",
                self.masked_url,
                self.scrub(&e.to_string())
            ),
        })?;
        self.clock.reset();
        Ok(())
    }

    /// Backends may echo the raw URL back in their messages
    fn scrub(&self, message: &str) -> String {
        mask_credentials(&message.replace(&self.url, &self.masked_url))
    }

    async fn read_once(&mut self) -> ReadOutcome {
        match self.grabber.grab().await {
            Ok(Grab::Frame(image)) => ReadOutcome::Frame(self.clock.stamp(image)),
            Ok(Grab::Miss) => ReadOutcome::Miss,
            Ok(Grab::EndOfStream) => ReadOutcome::Failed("stream ended".to_string()),
            Err(e) => ReadOutcome::Failed(self.scrub(&e.to_string())),
        }
    }

    async fn reconnect(&mut self, reason: String) -> CaptureResult<Option<BufferedFrame>> {
        for attempt in 1..=self.reconnect_attempts {
            warn!(
                "[{}] Reconnecting to {} (attempt {}/{}): {}",
                self.source_id(),
                self.masked_url,
                attempt,
                self.reconnect_attempts,
                reason
            );
            sleep(self.reconnect_delay).await;

            self.grabber.release().await;
            if let Err(e) = self.open_inner().await {
                debug!("[{}] Reopen failed: {}", self.source_id(), e);
                continue;
            }

            match self.read_once().await {
                ReadOutcome::Frame(frame) => {
                    self.reconnects += 1;
                    info!("[{}] Reconnection successful", self.source_id());
                    return Ok(Some(frame));
                }
                // Reopened but the first frame has not arrived yet
                ReadOutcome::Miss => {
                    self.reconnects += 1;
                    info!("[{}] Reconnected, waiting for frames", self.source_id());
                    return Ok(None);
                }
                ReadOutcome::Failed(reason) => {
                    debug!("[{}] Re-read failed: {}", self.source_id(), reason);
                }
            }
        }

        error!(
            "[{}] Giving up on {} after {} reconnect attempts",
            self.source_id(),
            self.masked_url,
            self.reconnect_attempts
        );
        self.grabber.release().await;

        Err(CaptureError::Read {
            source_id: self.source_id().to_string(),
            details: format!(
                "{} (reconnect attempts exhausted: {})",
                reason, self.reconnect_attempts
            ),
        })
    }
}

enum ReadOutcome {
    Frame(BufferedFrame),
    Miss,
    Failed(String),
}

#[async_trait]
impl SourceAdapter for NetworkAdapter {
    fn source_id(&self) -> &str {
        self.clock.source_id()
    }

    async fn open(&mut self) -> CaptureResult<()> {
        info!(
            "[{}] Connecting to stream: {}",
            self.source_id(),
            self.masked_url
        );
        self.open_inner().await?;
        info!("[{}] Stream connected", self.source_id());
        Ok(())
    }

    async fn read(&mut self) -> CaptureResult<Option<BufferedFrame>> {
        if !self.grabber.is_open() {
            return Ok(None);
        }

        match self.read_once().await {
            ReadOutcome::Frame(frame) => Ok(Some(frame)),
            ReadOutcome::Miss => Ok(None),
            ReadOutcome::Failed(reason) => self.reconnect(reason).await,
        }
    }

    async fn close(&mut self) {
        if self.grabber.is_open() {
            self.grabber.release().await;
            debug!("[{}] Stream {} closed", self.source_id(), self.masked_url);
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
                details: self.scrub(&e.to_string()),
            })?;
        debug!(
            "[{}] Requested {}x{} from {}: {}",
            self.source_id(),
            width,
            height,
            self.masked_url,
            if applied { "applied" } else { "not supported" }
        );
        Ok(applied)
    }
}
