use super::adapter::SourceAdapter;
use super::descriptor::SourceKind;
use super::device::DeviceAdapter;
use super::file::FileAdapter;
use super::grabber::FrameGrabber;
use super::network::NetworkAdapter;
use crate::config::{CaptureConfig, SourceConfig};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[cfg(not(all(feature = "gstreamer", target_os = "linux")))]
use super::grabber::SyntheticGrabber;
#[cfg(not(all(feature = "gstreamer", target_os = "linux")))]
use tracing::warn;

#[cfg(all(feature = "gstreamer", target_os = "linux"))]
use super::gst::GstGrabber;

/// Builds the adapter for a source. The orchestrator holds one of these so
/// tests can substitute scripted adapters.
pub type AdapterFactory =
    Arc<dyn Fn(&SourceConfig, &CaptureConfig) -> Box<dyn SourceAdapter> + Send + Sync>;

#[cfg(not(all(feature = "gstreamer", target_os = "linux")))]
const SYNTHETIC_RESOLUTION: (u32, u32) = (640, 480);
#[cfg(not(all(feature = "gstreamer", target_os = "linux")))]
const SYNTHETIC_FILE_FRAMES: u64 = 300;

/// Factory backed by the compiled-in capture backend
pub fn default_factory() -> AdapterFactory {
    Arc::new(|source: &SourceConfig, capture: &CaptureConfig| create_adapter(source, capture))
}

/// Pick the adapter variant from the descriptor and wire it to a grabber.
pub fn create_adapter(source: &SourceConfig, capture: &CaptureConfig) -> Box<dyn SourceAdapter> {
    let kind = SourceKind::from_descriptor(&source.descriptor);
    info!(
        "[{}] Creating {} adapter for {}",
        source.id,
        kind.label(),
        kind.display_descriptor()
    );

    match kind {
        SourceKind::Device(index) => Box::new(DeviceAdapter::new(
            source.id.clone(),
            index,
            device_grabber(index, capture),
        )),
        SourceKind::Network(url) => Box::new(NetworkAdapter::new(
            source.id.clone(),
            &url,
            network_grabber(&url),
            capture.reconnect_attempts,
            capture.reconnect_delay(),
        )),
        SourceKind::File(path) => Box::new(FileAdapter::new(
            source.id.clone(),
            &path,
            capture.loop_files,
            file_grabber(&path),
        )),
    }
}

#[cfg(all(feature = "gstreamer", target_os = "linux"))]
fn device_grabber(index: u32, capture: &CaptureConfig) -> Box<dyn FrameGrabber> {
    Box::new(GstGrabber::device(index, capture.device_resolution))
}

#[cfg(all(feature = "gstreamer", target_os = "linux"))]
fn network_grabber(url: &str) -> Box<dyn FrameGrabber> {
    Box::new(GstGrabber::network(url))
}

#[cfg(all(feature = "gstreamer", target_os = "linux"))]
fn file_grabber(path: &Path) -> Box<dyn FrameGrabber> {
    Box::new(GstGrabber::file(path))
}

#[cfg(not(all(feature = "gstreamer", target_os = "linux")))]
fn device_grabber(index: u32, capture: &CaptureConfig) -> Box<dyn FrameGrabber> {
    warn!(
        "GStreamer backend not compiled in, camera {} uses synthetic frames",
        index
    );
    let (width, height) = capture.device_resolution.unwrap_or(SYNTHETIC_RESOLUTION);
    Box::new(SyntheticGrabber::new(width, height, 30.0))
}

#[cfg(not(all(feature = "gstreamer", target_os = "linux")))]
fn network_grabber(_url: &str) -> Box<dyn FrameGrabber> {
    warn!("GStreamer backend not compiled in, network stream uses synthetic frames");
    let (width, height) = SYNTHETIC_RESOLUTION;
    Box::new(SyntheticGrabber::new(width, height, 25.0))
}

#[cfg(not(all(feature = "gstreamer", target_os = "linux")))]
fn file_grabber(path: &Path) -> Box<dyn FrameGrabber> {
    warn!(
        "GStreamer backend not compiled in, {} plays back synthetic frames",
        path.display()
    );
    let (width, height) = SYNTHETIC_RESOLUTION;
    Box::new(SyntheticGrabber::new(width, height, 25.0).with_frame_limit(SYNTHETIC_FILE_FRAMES))
}
