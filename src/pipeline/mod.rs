mod inference;
mod result;
mod smoothing;

pub use inference::{
    DensityEstimator, ImageNetPreprocessor, InferenceResult, InputTensor, PreprocessInfo,
    Preprocessor, Sizing,
};
pub use result::{DensityResult, PerformanceStats};
pub use smoothing::CountSmoother;

use crate::config::PipelineConfig;
use crate::frame::BufferedFrame;
use crate::level::density_per_area;
use crate::surface::{sanitize, SurfaceSummary};
use chrono::Utc;
use image::RgbImage;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace};

/// Per-stream result pipeline: preprocess, estimate, smooth, classify.
///
/// Holds smoothing and timing state, so use one instance per logical stream.
pub struct DensityPipeline {
    config: PipelineConfig,
    preprocessor: Arc<dyn Preprocessor>,
    estimator: Arc<dyn DensityEstimator>,
    smoother: Option<CountSmoother>,
    timings: VecDeque<f64>,
    frames_processed: u64,
}

impl DensityPipeline {
    pub fn new(
        config: PipelineConfig,
        preprocessor: Arc<dyn Preprocessor>,
        estimator: Arc<dyn DensityEstimator>,
    ) -> Self {
        let smoother = config
            .enable_smoothing
            .then(|| CountSmoother::new(config.smoothing_window));

        info!(
            "Density pipeline using {} (smoothing: {}, window: {})",
            estimator.name(),
            config.enable_smoothing,
            config.smoothing_window
        );

        Self {
            config,
            preprocessor,
            estimator,
            smoother,
            timings: VecDeque::new(),
            frames_processed: 0,
        }
    }

    /// Pipeline with the default ImageNet preprocessor
    pub fn with_estimator(config: PipelineConfig, estimator: Arc<dyn DensityEstimator>) -> Self {
        Self::new(config, Arc::new(ImageNetPreprocessor::default()), estimator)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn sizing(&self) -> Sizing {
        match self.config.target_size {
            Some((width, height)) => Sizing::Target(width, height),
            None => Sizing::Scale(self.config.scale_factor),
        }
    }

    /// Process a captured frame over the configured area
    pub fn process_frame(&mut self, frame: &BufferedFrame) -> InferenceResult<DensityResult> {
        self.process(&frame.image, None)
    }

    /// Process one image. `area_sqm` overrides the configured area for this call.
    pub fn process(
        &mut self,
        image: &RgbImage,
        area_sqm: Option<f64>,
    ) -> InferenceResult<DensityResult> {
        let started = Instant::now();
        let area = area_sqm.unwrap_or(self.config.area_sqm);

        let (tensor, info) = self.preprocessor.preprocess(image, self.sizing())?;
        let surface = sanitize(self.estimator.estimate(&tensor)?)?;
        let summary = SurfaceSummary::of(&surface);

        let raw_count = summary.sum.max(0.0);
        let count = match self.smoother.as_mut() {
            Some(smoother) => smoother.push(raw_count),
            None => raw_count,
        };

        let density = density_per_area(count, area);
        let level = self.config.thresholds.classify(density);

        let processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.record_timing(processing_time_ms);

        trace!(
            "Processed frame: raw={:.2} smoothed={:.2} density={:.3}/sqm level={}",
            raw_count,
            count,
            density,
            level
        );

        Ok(DensityResult {
            count,
            raw_count,
            density_per_sqm: density,
            level,
            processing_time_ms,
            frame_shape: info.original_shape,
            timestamp: Utc::now(),
            max_density: summary.max,
            min_density: summary.min,
            std_density: summary.std,
            density_map: surface,
        })
    }

    fn record_timing(&mut self, elapsed_ms: f64) {
        self.frames_processed += 1;
        if self.config.timing_history == 0 {
            return;
        }
        if self.timings.len() == self.config.timing_history {
            self.timings.pop_front();
        }
        self.timings.push_back(elapsed_ms);
    }

    /// Clear the smoothing window, e.g. after a file loop restart
    pub fn reset(&mut self) {
        if let Some(smoother) = self.smoother.as_mut() {
            smoother.clear();
        }
        debug!("Smoothing window cleared");
    }

    /// Run `iterations` black frames through the estimator, then forget them
    pub fn warmup(&mut self, iterations: usize) -> InferenceResult<()> {
        info!("Warming up density pipeline ({} iterations)", iterations);
        let dummy = RgbImage::new(640, 480);
        for _ in 0..iterations {
            self.process(&dummy, None)?;
        }

        let performance = self.performance();
        self.reset();
        self.timings.clear();
        self.frames_processed = 0;

        info!(
            "Warmup complete, average processing {:.1}ms",
            performance.average_ms
        );
        Ok(())
    }

    pub fn average_processing_ms(&self) -> f64 {
        if self.timings.is_empty() {
            return 0.0;
        }
        self.timings.iter().sum::<f64>() / self.timings.len() as f64
    }

    pub fn performance(&self) -> PerformanceStats {
        let average_ms = self.average_processing_ms();
        PerformanceStats {
            average_ms,
            estimated_fps: if average_ms > 0.0 {
                1000.0 / average_ms
            } else {
                0.0
            },
            frames_processed: self.frames_processed,
        }
    }

    /// Values currently held in the smoothing window
    pub fn smoothing_depth(&self) -> usize {
        self.smoother.as_ref().map(|s| s.len()).unwrap_or(0)
    }
}
