mod adapter;
mod descriptor;
mod device;
mod factory;
mod file;
mod frames;
mod grabber;
#[cfg(all(feature = "gstreamer", target_os = "linux"))]
mod gst;
mod network;

pub use adapter::{CaptureResult, FrameClock, SourceAdapter};
pub use descriptor::{mask_credentials, SourceKind};
pub use device::DeviceAdapter;
pub use factory::{create_adapter, default_factory, AdapterFactory};
pub use file::FileAdapter;
pub use frames::frames;
pub use grabber::{BlockingGrabber, FrameGrabber, Grab, SyntheticGrabber};
#[cfg(all(feature = "gstreamer", target_os = "linux"))]
pub use gst::GstGrabber;
pub use network::NetworkAdapter;
