use crate::level::{density_per_area, DensityLevel, LevelThresholds};
use crate::surface::DensitySurface;
use serde::Serialize;

/// Pixel bounds, end-exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ZoneBounds {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Zone {
    pub zone_id: String,
    pub row: usize,
    pub col: usize,
    pub bounds: ZoneBounds,
    pub count: f64,
    pub density_per_sqm: f64,
    pub level: DensityLevel,
}

/// Split the surface into a `rows` x `cols` grid of equal cells.
///
/// Cell size is the integer quotient of the surface size by the grid size,
/// so trailing rows and columns that do not fill a whole cell belong to no
/// zone. Each zone covers `area_sqm / (rows * cols)`.
pub(crate) fn partition(
    surface: &DensitySurface,
    rows: usize,
    cols: usize,
    area_sqm: f64,
    thresholds: &LevelThresholds,
) -> Vec<Zone> {
    if rows == 0 || cols == 0 {
        return Vec::new();
    }

    let zone_h = surface.height() / rows as u32;
    let zone_w = surface.width() / cols as u32;
    let zone_area = area_sqm / (rows * cols) as f64;

    let mut zones = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            let bounds = ZoneBounds {
                x1: col as u32 * zone_w,
                y1: row as u32 * zone_h,
                x2: (col as u32 + 1) * zone_w,
                y2: (row as u32 + 1) * zone_h,
            };

            let mut count = 0.0f64;
            for y in bounds.y1..bounds.y2 {
                for x in bounds.x1..bounds.x2 {
                    count += surface.get_pixel(x, y)[0].max(0.0) as f64;
                }
            }

            let density = density_per_area(count, zone_area);
            zones.push(Zone {
                zone_id: format!("zone_{}_{}", row, col),
                row,
                col,
                bounds,
                count,
                density_per_sqm: density,
                level: thresholds.classify(density),
            });
        }
    }

    zones
}
