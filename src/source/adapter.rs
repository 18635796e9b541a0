use crate::error::CaptureError;
use crate::frame::{BufferedFrame, FrameMetadata};
use async_trait::async_trait;
use chrono::Utc;
use image::RgbImage;
use std::time::Instant;

pub type CaptureResult<T> = std::result::Result<T, CaptureError>;

/// Uniform contract over every kind of video feed.
///
/// `read` distinguishes three outcomes: `Ok(Some(frame))`, `Ok(None)` for a
/// transient miss (not an error), and `Err` for a read fault. `close` must be
/// safe to call any number of times.
#[async_trait]
pub trait SourceAdapter: Send {
    fn source_id(&self) -> &str;

    async fn open(&mut self) -> CaptureResult<()>;

    async fn read(&mut self) -> CaptureResult<Option<BufferedFrame>>;

    async fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Current resolution (width, height), (0, 0) when unknown
    fn resolution(&self) -> (u32, u32);

    /// Rate advertised by the feed, 0.0 when unknown
    fn fps(&self) -> f64;

    /// Frames read since open divided by elapsed wall time
    fn measured_fps(&self) -> f64;

    /// Ask the feed for a different resolution. Returns true only when the
    /// feed confirms it now delivers exactly `width`x`height`.
    async fn set_resolution(&mut self, _width: u32, _height: u32) -> CaptureResult<bool> {
        Ok(false)
    }
}

/// Sequence numbering and instantaneous rate measurement shared by adapters.
#[derive(Debug)]
pub struct FrameClock {
    source_id: String,
    frames: u64,
    started: Option<Instant>,
    fps: f64,
}

impl FrameClock {
    pub fn new<S: Into<String>>(source_id: S) -> Self {
        Self {
            source_id: source_id.into(),
            frames: 0,
            started: None,
            fps: 0.0,
        }
    }

    /// Restart counting from zero; called on open and on file loop restarts
    pub fn reset(&mut self) {
        self.frames = 0;
        self.started = Some(Instant::now());
        self.fps = 0.0;
    }

    /// Attach metadata to a freshly read image, updating the rate estimate
    pub fn stamp(&mut self, image: RgbImage) -> BufferedFrame {
        let started = *self.started.get_or_insert_with(Instant::now);
        self.frames += 1;

        let elapsed = started.elapsed().as_secs_f64();
        self.fps = if elapsed > 0.0 {
            self.frames as f64 / elapsed
        } else {
            0.0
        };

        let metadata = FrameMetadata {
            timestamp: Utc::now(),
            sequence: self.frames,
            source_id: self.source_id.clone(),
            resolution: image.dimensions(),
            fps: self.fps,
        };

        BufferedFrame::new(image, metadata)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_clock_sequences_from_one() {
        let mut clock = FrameClock::new("cam");
        clock.reset();

        let first = clock.stamp(RgbImage::new(4, 2));
        let second = clock.stamp(RgbImage::new(4, 2));

        assert_eq!(first.metadata.sequence, 1);
        assert_eq!(second.metadata.sequence, 2);
        assert_eq!(second.metadata.resolution, (4, 2));
        assert_eq!(second.metadata.source_id, "cam");
        assert!(second.metadata.fps >= 0.0);
    }

    #[test]
    fn test_frame_clock_reset() {
        let mut clock = FrameClock::new("cam");
        clock.reset();
        clock.stamp(RgbImage::new(1, 1));
        clock.stamp(RgbImage::new(1, 1));
        assert_eq!(clock.frames(), 2);

        clock.reset();
        assert_eq!(clock.frames(), 0);
        assert_eq!(clock.fps(), 0.0);
        assert_eq!(clock.stamp(RgbImage::new(1, 1)).metadata.sequence, 1);
    }
}
