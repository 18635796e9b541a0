use crate::error::InferenceError;
use image::{ImageBuffer, Luma};
use serde::Serialize;

/// 2-D grid of non-negative person densities; the sum approximates a count.
pub type DensitySurface = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Build a surface from row-major values
pub fn surface_from_rows(rows: &[Vec<f32>]) -> Result<DensitySurface, InferenceError> {
    let height = rows.len() as u32;
    let width = rows.first().map(|r| r.len()).unwrap_or(0) as u32;

    if rows.iter().any(|r| r.len() as u32 != width) {
        return Err(InferenceError::InvalidSurface {
            details: "Rows have differing lengths".to_string(),
        });
    }

    let data: Vec<f32> = rows.iter().flatten().copied().collect();
    ImageBuffer::from_raw(width, height, data).ok_or_else(|| InferenceError::InvalidSurface {
        details: format!("Cannot build {}x{} surface", width, height),
    })
}

/// Reject empty or non-finite surfaces and clamp negative noise to zero.
pub fn sanitize(mut surface: DensitySurface) -> Result<DensitySurface, InferenceError> {
    if surface.width() == 0 || surface.height() == 0 {
        return Err(InferenceError::InvalidSurface {
            details: "Density surface is empty".to_string(),
        });
    }

    for value in surface.iter_mut() {
        if !value.is_finite() {
            return Err(InferenceError::InvalidSurface {
                details: format!("Density surface contains non-finite value {}", value),
            });
        }
        if *value < 0.0 {
            *value = 0.0;
        }
    }

    Ok(surface)
}

/// Distributional moments of a surface (population standard deviation)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SurfaceSummary {
    pub sum: f64,
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    pub std: f64,
}

impl SurfaceSummary {
    pub fn of(surface: &DensitySurface) -> Self {
        let cells = surface.as_raw();
        if cells.is_empty() {
            return Self {
                sum: 0.0,
                mean: 0.0,
                max: 0.0,
                min: 0.0,
                std: 0.0,
            };
        }

        let n = cells.len() as f64;
        let mut sum = 0.0f64;
        let mut max = f64::MIN;
        let mut min = f64::MAX;
        for &value in cells {
            let value = value as f64;
            sum += value;
            max = max.max(value);
            min = min.min(value);
        }

        let mean = sum / n;
        let variance = cells
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;

        Self {
            sum,
            mean,
            max,
            min,
            std: variance.sqrt(),
        }
    }
}
