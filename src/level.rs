use serde::{Deserialize, Serialize};
use std::fmt;

/// Crowd density classification, ordered from sparsest to densest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DensityLevel {
    /// Open space, unrestricted movement
    FreeFlow,
    /// Comfortable walking space
    Low,
    /// Normal crowd, some navigation needed
    Medium,
    /// Dense crowd, limited movement
    High,
    /// Risk of crowd crush
    Critical,
}

impl DensityLevel {
    pub fn description(&self) -> &'static str {
        match self {
            DensityLevel::FreeFlow => "Open space, free movement",
            DensityLevel::Low => "Comfortable walking space",
            DensityLevel::Medium => "Normal crowd density",
            DensityLevel::High => "Dense crowd, limited movement",
            DensityLevel::Critical => "SAFETY ALERT: Very high density",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DensityLevel::FreeFlow => "FREE_FLOW",
            DensityLevel::Low => "LOW",
            DensityLevel::Medium => "MEDIUM",
            DensityLevel::High => "HIGH",
            DensityLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for DensityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ascending upper bounds (people per square meter) for each tier.
///
/// A value strictly below `low` is LOW, strictly below `medium` is MEDIUM and
/// so on; anything at or above `high` is CRITICAL. When `free_flow` is set, a
/// FREE_FLOW tier is carved out below LOW.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelThresholds {
    #[serde(default)]
    pub free_flow: Option<f64>,
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl LevelThresholds {
    /// Four-tier table used by the per-frame pipeline.
    pub fn four_tier() -> Self {
        Self {
            free_flow: None,
            low: 0.5,
            medium: 1.5,
            high: 3.0,
        }
    }

    /// Five-tier table used by the statistical analyzer.
    pub fn five_tier() -> Self {
        Self {
            free_flow: Some(0.3),
            ..Self::four_tier()
        }
    }

    pub fn classify(&self, density_per_sqm: f64) -> DensityLevel {
        if let Some(free_flow) = self.free_flow {
            if density_per_sqm < free_flow {
                return DensityLevel::FreeFlow;
            }
        }

        if density_per_sqm < self.low {
            DensityLevel::Low
        } else if density_per_sqm < self.medium {
            DensityLevel::Medium
        } else if density_per_sqm < self.high {
            DensityLevel::High
        } else {
            DensityLevel::Critical
        }
    }

    /// Thresholds must be finite, non-negative and strictly ascending, otherwise
    /// classification would stop being monotonic.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let mut bounds = Vec::with_capacity(4);
        if let Some(free_flow) = self.free_flow {
            bounds.push(("free_flow", free_flow));
        }
        bounds.push(("low", self.low));
        bounds.push(("medium", self.medium));
        bounds.push(("high", self.high));

        for (name, value) in &bounds {
            if !value.is_finite() || *value < 0.0 {
                return Err(format!(
                    "Threshold '{}' must be a finite non-negative number, got {}",
                    name, value
                ));
            }
        }

        for pair in bounds.windows(2) {
            if pair[0].1 >= pair[1].1 {
                return Err(format!(
                    "Threshold '{}' ({}) must be below '{}' ({})",
                    pair[0].0, pair[0].1, pair[1].0, pair[1].1
                ));
            }
        }

        Ok(())
    }
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self::four_tier()
    }
}

/// Count divided by area, with a non-positive area yielding zero.
pub fn density_per_area(count: f64, area_sqm: f64) -> f64 {
    if area_sqm > 0.0 && count.is_finite() {
        (count / area_sqm).max(0.0)
    } else {
        0.0
    }
}
