use crate::level::DensityLevel;
use crate::surface::DensitySurface;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Classified output for one processed frame.
#[derive(Debug, Clone, Serialize)]
pub struct DensityResult {
    /// Smoothed count (equals `raw_count` when smoothing is off)
    pub count: f64,
    /// Sum of this frame's density surface
    pub raw_count: f64,
    pub density_per_sqm: f64,
    pub level: DensityLevel,
    pub processing_time_ms: f64,
    /// Shape of the source frame as (height, width)
    pub frame_shape: (u32, u32),
    pub timestamp: DateTime<Utc>,
    pub max_density: f64,
    pub min_density: f64,
    pub std_density: f64,
    /// Clamped surface for downstream analysis; not part of the wire record
    #[serde(skip)]
    pub density_map: DensitySurface,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceStats {
    pub average_ms: f64,
    pub estimated_fps: f64,
    pub frames_processed: u64,
}
