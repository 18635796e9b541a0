use super::descriptor::mask_credentials;
use super::grabber::{FrameGrabber, Grab};
use crate::error::CaptureError;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use image::RgbImage;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// GStreamer pipeline ending in an RGB appsink.
pub struct GstGrabber {
    head: String,
    /// `head` with any URL credentials masked, for logs
    display_head: String,
    sink_options: &'static str,
    output_size: Option<(u32, u32)>,
    pull_timeout: gst::ClockTime,
    pipeline: Option<gst::Pipeline>,
    appsink: Option<AppSink>,
    resolution: (u32, u32),
    fps: f64,
}

fn backend_error<S: Into<String>>(details: S) -> CaptureError {
    CaptureError::Backend {
        details: details.into(),
    }
}

impl GstGrabber {
    fn with_head(head: String, sink_options: &'static str, pull_timeout_ms: u64) -> Self {
        Self {
            display_head: mask_credentials(&head),
            head,
            sink_options,
            output_size: None,
            pull_timeout: gst::ClockTime::from_mseconds(pull_timeout_ms),
            pipeline: None,
            appsink: None,
            resolution: (0, 0),
            fps: 0.0,
        }
    }

    /// V4L2 camera; the appsink keeps a single buffer to minimise latency
    pub fn device(index: u32, resolution: Option<(u32, u32)>) -> Self {
        let head = format!("v4l2src device=/dev/video{} io-mode=mmap ! decodebin", index);
        let mut grabber = Self::with_head(head, "max-buffers=1 drop=true", 100);
        grabber.output_size = resolution;
        grabber
    }

    /// Any URI GStreamer can decode (rtsp, rtmp, http)
    pub fn network(url: &str) -> Self {
        let head = format!("uridecodebin uri=\"{}\"", url);
        Self::with_head(head, "max-buffers=3 drop=true", 500)
    }

    /// Local file; frames are not dropped so every decoded frame is delivered
    pub fn file(path: &Path) -> Self {
        let head = format!("filesrc location=\"{}\" ! decodebin", path.display());
        Self::with_head(head, "max-buffers=4 drop=false", 200)
    }

    fn describe(&self, head: &str) -> String {
        let size = match self.output_size {
            Some((width, height)) => format!(",width={},height={}", width, height),
            None => String::new(),
        };
        format!(
            "{} ! videoscale ! videoconvert ! video/x-raw,format=RGB{} ! \
             appsink name=sink sync=false {}",
            head, size, self.sink_options
        )
    }

    fn sample_to_image(&mut self, sample: gst::Sample) -> Result<RgbImage, CaptureError> {
        let buffer = sample
            .buffer()
            .ok_or_else(|| backend_error("No buffer in sample"))?;
        let caps = sample
            .caps()
            .ok_or_else(|| backend_error("No caps in sample"))?;
        let video_info = VideoInfo::from_caps(caps)
            .map_err(|e| backend_error(format!("Failed to get video info: {}", e)))?;

        let width = video_info.width();
        let height = video_info.height();
        let stride = video_info.stride()[0] as usize;
        let row_bytes = width as usize * 3;

        let fps = video_info.fps();
        if fps.denom() != 0 {
            self.fps = fps.numer() as f64 / fps.denom() as f64;
        }
        self.resolution = (width, height);

        let map = buffer
            .map_readable()
            .map_err(|e| backend_error(format!("Failed to map buffer: {}", e)))?;
        let bytes = map.as_slice();

        let required = stride * (height as usize).saturating_sub(1) + row_bytes;
        if bytes.len() < required {
            return Err(backend_error(format!(
                "Short buffer: {} bytes for {}x{} (stride {})",
                bytes.len(),
                width,
                height,
                stride
            )));
        }

        let mut data = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            data.extend_from_slice(&bytes[start..start + row_bytes]);
        }

        RgbImage::from_raw(width, height, data)
            .ok_or_else(|| backend_error("Decoded frame does not fit its dimensions"))
    }

    fn pending_error(&self) -> Option<String> {
        let bus = self.pipeline.as_ref()?.bus()?;
        let message = bus.pop_filtered(&[gst::MessageType::Error])?;
        match message.view() {
            gst::MessageView::Error(err) => Some(err.error().to_string()),
            _ => None,
        }
    }
}

impl FrameGrabber for GstGrabber {
    fn open(&mut self) -> Result<(), CaptureError> {
        gst::init().map_err(|e| backend_error(format!("Failed to initialize GStreamer: {}", e)))?;

        debug!(
            "Creating GStreamer pipeline: {}",
            self.describe(&self.display_head)
        );

        let pipeline = gst::parse::launch(&self.describe(&self.head))
            .map_err(|e| backend_error(format!("Failed to create pipeline: {}", e)))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| backend_error("Failed to downcast to Pipeline"))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| backend_error("Failed to get appsink element"))?
            .downcast::<AppSink>()
            .map_err(|_| backend_error("Failed to downcast to AppSink"))?;

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| backend_error(format!("Failed to start pipeline: {}", e)))?;

        let (result, _, _) = pipeline.state(gst::ClockTime::from_seconds(5));
        if let Err(e) = result {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(backend_error(format!("Pipeline failed to reach PLAYING: {}", e)));
        }

        info!("GStreamer pipeline started");
        self.pipeline = Some(pipeline);
        self.appsink = Some(appsink);
        Ok(())
    }

    fn grab(&mut self) -> Result<Grab, CaptureError> {
        let sample = match &self.appsink {
            Some(appsink) => match appsink.try_pull_sample(self.pull_timeout) {
                Some(sample) => sample,
                None if appsink.is_eos() => return Ok(Grab::EndOfStream),
                None => {
                    return match self.pending_error() {
                        Some(details) => Err(backend_error(details)),
                        None => Ok(Grab::Miss),
                    }
                }
            },
            None => return Ok(Grab::Miss),
        };

        let image = self.sample_to_image(sample)?;
        trace!("Pulled {}x{} frame", image.width(), image.height());
        Ok(Grab::Frame(image))
    }

    fn rewind(&mut self) -> Result<(), CaptureError> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| backend_error("Pipeline not initialized"))?;

        pipeline
            .seek_simple(
                gst::SeekFlags::FLUSH | gst::SeekFlags::KEY_UNIT,
                gst::ClockTime::ZERO,
            )
            .map_err(|e| backend_error(format!("Failed to seek to start: {}", e)))
    }

    fn release(&mut self) {
        self.appsink = None;
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.set_state(gst::State::Null) {
                warn!("Failed to stop GStreamer pipeline: {}", e);
            }
        }
    }

    fn is_open(&self) -> bool {
        self.pipeline.is_some()
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn nominal_fps(&self) -> f64 {
        self.fps
    }

    fn duration(&self) -> Option<Duration> {
        let length = self.pipeline.as_ref()?.query_duration::<gst::ClockTime>()?;
        Some(Duration::from_nanos(length.nseconds()))
    }

    /// Rebuilds a running pipeline with the new output caps
    fn set_resolution(&mut self, width: u32, height: u32) -> Result<bool, CaptureError> {
        if width == 0 || height == 0 {
            return Ok(false);
        }

        self.output_size = Some((width, height));
        if self.pipeline.is_some() {
            self.release();
            self.open()?;
        }
        Ok(true)
    }
}

impl Drop for GstGrabber {
    fn drop(&mut self) {
        self.release();
    }
}
