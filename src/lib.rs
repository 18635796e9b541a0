pub mod analyzer;
pub mod config;
pub mod error;
pub mod frame;
pub mod frame_channel;
pub mod level;
pub mod orchestrator;
pub mod pipeline;
pub mod source;
pub mod surface;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use analyzer::{DensityAnalyzer, DensityStats, SafetyAssessment, SafetyStatus, Zone};
pub use config::{CaptureConfig, CrowdConfig, OverflowPolicy, SourceConfig};
pub use error::{CaptureError, CrowdError, InferenceError, Result};
pub use frame::{BufferedFrame, FrameMetadata};
pub use frame_channel::{ChannelStats, FrameChannel};
pub use level::{DensityLevel, LevelThresholds};
pub use orchestrator::{ErrorRecord, SourceOrchestrator};
pub use pipeline::{DensityEstimator, DensityPipeline, DensityResult, Preprocessor};
pub use source::{SourceAdapter, SourceKind};
pub use surface::DensitySurface;
pub use worker::{CaptureWorker, SourceStatus, WorkerState};
