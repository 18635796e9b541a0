use crate::error::InferenceError;
use crate::surface::DensitySurface;
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::Serialize;

pub type InferenceResult<T> = std::result::Result<T, InferenceError>;

/// How the preprocessing hook should size its output
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sizing {
    /// Explicit (width, height)
    Target(u32, u32),
    /// Multiply both dimensions by this factor
    Scale(f64),
}

/// Normalized planar (CHW) float tensor handed to the estimator
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    pub channels: usize,
    pub height: u32,
    pub width: u32,
    pub data: Vec<f32>,
}

/// Shapes are (height, width); scales map processed back to original
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PreprocessInfo {
    pub original_shape: (u32, u32),
    pub processed_shape: (u32, u32),
    pub scale_h: f64,
    pub scale_w: f64,
}

/// Turns a raw frame into the estimator's input.
pub trait Preprocessor: Send + Sync {
    fn preprocess(
        &self,
        frame: &RgbImage,
        sizing: Sizing,
    ) -> InferenceResult<(InputTensor, PreprocessInfo)>;
}

/// Maps a normalized tensor to a non-negative density surface whose sum
/// approximates the number of people in view.
pub trait DensityEstimator: Send + Sync {
    fn estimate(&self, input: &InputTensor) -> InferenceResult<DensitySurface>;

    fn name(&self) -> &str {
        "estimator"
    }
}

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Resize plus ImageNet mean/std normalization.
///
/// Output dimensions are clamped to `[min_side, max_side]` and rounded down to
/// a multiple of `divisor` so downsampling backbones see aligned inputs.
#[derive(Debug, Clone)]
pub struct ImageNetPreprocessor {
    pub min_side: u32,
    pub max_side: u32,
    pub divisor: u32,
}

impl Default for ImageNetPreprocessor {
    fn default() -> Self {
        Self {
            min_side: 256,
            max_side: 2048,
            divisor: 8,
        }
    }
}

impl ImageNetPreprocessor {
    fn target_dimensions(&self, width: u32, height: u32, sizing: Sizing) -> (u32, u32) {
        let (w, h) = match sizing {
            Sizing::Target(w, h) => (w, h),
            Sizing::Scale(factor) => (
                (width as f64 * factor) as u32,
                (height as f64 * factor) as u32,
            ),
        };

        let align = |side: u32| {
            let clamped = side.clamp(self.min_side, self.max_side);
            let divisor = self.divisor.max(1);
            (clamped / divisor).max(1) * divisor
        };

        (align(w), align(h))
    }
}

impl Preprocessor for ImageNetPreprocessor {
    fn preprocess(
        &self,
        frame: &RgbImage,
        sizing: Sizing,
    ) -> InferenceResult<(InputTensor, PreprocessInfo)> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(InferenceError::Preprocess {
                details: format!("Cannot preprocess a {}x{} frame", width, height),
            });
        }

        let (new_w, new_h) = self.target_dimensions(width, height, sizing);
        let resized;
        let source = if (new_w, new_h) != (width, height) {
            resized = imageops::resize(frame, new_w, new_h, FilterType::Triangle);
            &resized
        } else {
            frame
        };

        let plane = (new_w * new_h) as usize;
        let mut data = vec![0.0f32; plane * 3];
        for (i, pixel) in source.pixels().enumerate() {
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                data[c * plane + i] = (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            }
        }

        let info = PreprocessInfo {
            original_shape: (height, width),
            processed_shape: (new_h, new_w),
            scale_h: height as f64 / new_h as f64,
            scale_w: width as f64 / new_w as f64,
        };

        Ok((
            InputTensor {
                channels: 3,
                height: new_h,
                width: new_w,
                data,
            },
            info,
        ))
    }
}
