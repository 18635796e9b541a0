mod safety;
mod stats;
mod zones;

pub use safety::{risk_score, SafetyAssessment, SafetyStatus};
pub use stats::{estimated_flow_rate, DensityStats};
pub use zones::{Zone, ZoneBounds};

use crate::config::AnalyzerConfig;
use crate::level::density_per_area;
use crate::pipeline::{DensityResult, InferenceResult};
use crate::surface::{sanitize, DensitySurface, SurfaceSummary};
use tracing::debug;

/// Stateless statistical analysis of density surfaces.
///
/// Every output is a pure function of the surface, the optional count and
/// the area, so one analyzer can be shared freely between streams.
#[derive(Debug, Clone, Default)]
pub struct DensityAnalyzer {
    config: AnalyzerConfig,
}

impl DensityAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze a surface. A finite `count` replaces the surface sum as the
    /// overall count.
    pub fn analyze(
        &self,
        surface: &DensitySurface,
        count: Option<f64>,
        area_sqm: f64,
    ) -> InferenceResult<DensityStats> {
        let surface = sanitize(surface.clone())?;
        let summary = SurfaceSummary::of(&surface);

        let total_count = count
            .filter(|c| c.is_finite())
            .unwrap_or(summary.sum)
            .max(0.0);
        let density = density_per_area(total_count, area_sqm);
        let level = self.config.thresholds.classify(density);

        let mask = stats::threshold_mask(&surface, summary.mean + 2.0 * summary.std);
        let hotspot_count = stats::count_regions(&mask);
        let hotspot_percentage = stats::masked_percentage(&mask);

        let critical_area_percentage =
            stats::critical_area_percentage(&surface, area_sqm, self.config.thresholds.high);
        let estimated_flow_rate = estimated_flow_rate(density, self.config.base_flow_rate);

        let safety = safety::assess(
            level,
            density,
            hotspot_count,
            hotspot_percentage,
            critical_area_percentage,
        );

        debug!(
            "Density analysis: count={:.1} density={:.3}/sqm level={} hotspots={} status={:?}",
            total_count, density, level, hotspot_count, safety.overall_status
        );

        Ok(DensityStats {
            total_count,
            density_per_sqm: density,
            level,
            mean_density: summary.mean,
            max_density: summary.max,
            min_density: summary.min,
            std_density: summary.std,
            hotspot_count,
            hotspot_percentage,
            critical_area_percentage,
            estimated_flow_rate,
            safety,
        })
    }

    /// Analyze a pipeline result, reusing its smoothed count
    pub fn analyze_result(
        &self,
        result: &DensityResult,
        area_sqm: f64,
    ) -> InferenceResult<DensityStats> {
        self.analyze(&result.density_map, Some(result.count), area_sqm)
    }

    /// Grid breakdown using the configured zone rows and columns
    pub fn analyze_zones(
        &self,
        surface: &DensitySurface,
        area_sqm: f64,
    ) -> InferenceResult<Vec<Zone>> {
        self.analyze_zones_with_grid(
            surface,
            area_sqm,
            self.config.zone_rows,
            self.config.zone_cols,
        )
    }

    pub fn analyze_zones_with_grid(
        &self,
        surface: &DensitySurface,
        area_sqm: f64,
        rows: usize,
        cols: usize,
    ) -> InferenceResult<Vec<Zone>> {
        let surface = sanitize(surface.clone())?;
        Ok(zones::partition(
            &surface,
            rows,
            cols,
            area_sqm,
            &self.config.thresholds,
        ))
    }

    /// Safety assessment for already computed statistics
    pub fn assess_safety(&self, stats: &DensityStats) -> SafetyAssessment {
        safety::assess(
            stats.level,
            stats.density_per_sqm,
            stats.hotspot_count,
            stats.hotspot_percentage,
            stats.critical_area_percentage,
        )
    }
}
