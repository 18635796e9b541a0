use super::safety::SafetyAssessment;
use crate::level::DensityLevel;
use crate::surface::DensitySurface;
use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use serde::Serialize;

/// Full statistical breakdown of one density surface
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DensityStats {
    pub total_count: f64,
    pub density_per_sqm: f64,
    pub level: DensityLevel,

    pub mean_density: f64,
    pub max_density: f64,
    pub min_density: f64,
    pub std_density: f64,

    /// 8-connected regions above mean + 2 std
    pub hotspot_count: usize,
    pub hotspot_percentage: f64,

    pub critical_area_percentage: f64,
    /// People per meter per second
    pub estimated_flow_rate: f64,

    pub safety: SafetyAssessment,
}

/// Binary mask of cells strictly above `threshold`
pub(crate) fn threshold_mask(surface: &DensitySurface, threshold: f64) -> GrayImage {
    GrayImage::from_fn(surface.width(), surface.height(), |x, y| {
        if surface.get_pixel(x, y)[0] as f64 > threshold {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

pub(crate) fn masked_percentage(mask: &GrayImage) -> f64 {
    let cells = mask.as_raw().len();
    if cells == 0 {
        return 0.0;
    }
    let set = mask.as_raw().iter().filter(|v| **v > 0).count();
    set as f64 / cells as f64 * 100.0
}

/// Number of 8-connected foreground regions
pub(crate) fn count_regions(mask: &GrayImage) -> usize {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    labels.pixels().map(|p| p[0]).max().unwrap_or(0) as usize
}

/// Share of cells whose value, rescaled to people per square meter with a
/// uniform per-cell area, exceeds `high_threshold`. Zero for a non-positive
/// area.
pub(crate) fn critical_area_percentage(
    surface: &DensitySurface,
    area_sqm: f64,
    high_threshold: f64,
) -> f64 {
    let cells = surface.as_raw().len();
    if cells == 0 || area_sqm.is_nan() || area_sqm <= 0.0 {
        return 0.0;
    }

    let area_per_cell = area_sqm / cells as f64;
    let critical = surface
        .as_raw()
        .iter()
        .filter(|v| **v as f64 / area_per_cell > high_threshold)
        .count();

    critical as f64 / cells as f64 * 100.0
}

/// Linear slowdown with density, floored at 10% of the free-flow rate
pub fn estimated_flow_rate(density_per_sqm: f64, base_flow_rate: f64) -> f64 {
    let factor = (1.0 - density_per_sqm / 5.0).max(0.1);
    factor * base_flow_rate
}
