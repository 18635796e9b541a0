use crate::level::LevelThresholds;
use crate::source::mask_credentials;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct CrowdConfig {
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
}

/// One configured video feed. Immutable for the lifetime of its worker.
#[derive(Deserialize, Serialize, Clone, PartialEq)]
pub struct SourceConfig {
    /// Unique key for this feed
    pub id: String,

    /// Device index ("0"), network URL ("rtsp://...") or file path
    pub descriptor: String,

    /// Human-readable area name (e.g. "Main Gate")
    #[serde(default)]
    pub name: String,

    /// Area covered by the feed in square meters
    #[serde(default = "default_area_sqm")]
    pub area_sqm: f64,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl SourceConfig {
    pub fn new<S: Into<String>>(id: S, descriptor: S, name: S, area_sqm: f64) -> Self {
        Self {
            id: id.into(),
            descriptor: descriptor.into(),
            name: name.into(),
            area_sqm,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

// Debug output ends up in logs, so the descriptor is shown masked
impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("id", &self.id)
            .field("descriptor", &mask_credentials(&self.descriptor))
            .field("name", &self.name)
            .field("area_sqm", &self.area_sqm)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Overflow behaviour of a bounded frame channel.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest frame to admit a new one; never blocks the producer
    DropOldest,
    /// Wait for space, up to an optional timeout
    Block,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Frame channel capacity per source
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    #[serde(default = "default_overflow")]
    pub overflow: OverflowPolicy,

    /// Producer wait limit in block mode (None waits indefinitely)
    #[serde(default)]
    pub put_timeout_ms: Option<u64>,

    /// Reconnect cycles a network adapter attempts after a failed read
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Restart file sources from the first frame on end of stream
    #[serde(default)]
    pub loop_files: bool,

    /// Sleep after a read that produced no frame
    #[serde(default = "default_miss_backoff_ms")]
    pub miss_backoff_ms: u64,

    /// Sleep after a read fault
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,

    /// Bound on joining a worker before its adapter is force-released
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    /// Most recent errors kept across all sources
    #[serde(default = "default_error_log_capacity")]
    pub error_log_capacity: usize,

    /// Requested device resolution (width, height)
    #[serde(default)]
    pub device_resolution: Option<(u32, u32)>,
}

impl CaptureConfig {
    pub fn put_timeout(&self) -> Option<Duration> {
        self.put_timeout_ms.map(Duration::from_millis)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn miss_backoff(&self) -> Duration {
        Duration::from_millis(self.miss_backoff_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PipelineConfig {
    /// Four-tier classification bounds in people per square meter
    #[serde(default = "LevelThresholds::four_tier")]
    pub thresholds: LevelThresholds,

    #[serde(default = "default_enable_smoothing")]
    pub enable_smoothing: bool,

    /// Number of recent raw counts averaged when smoothing
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window: usize,

    /// Input resize factor handed to the preprocessing hook
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,

    /// Explicit (width, height) for preprocessing, overrides scale_factor
    #[serde(default)]
    pub target_size: Option<(u32, u32)>,

    /// Area used when a frame is processed without an explicit area
    #[serde(default = "default_area_sqm")]
    pub area_sqm: f64,

    /// Processing durations retained for performance introspection
    #[serde(default = "default_timing_history")]
    pub timing_history: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnalyzerConfig {
    /// Five-tier classification bounds in people per square meter
    #[serde(default = "LevelThresholds::five_tier")]
    pub thresholds: LevelThresholds,

    #[serde(default = "default_zone_rows")]
    pub zone_rows: usize,

    #[serde(default = "default_zone_cols")]
    pub zone_cols: usize,

    /// People per meter per second at free flow
    #[serde(default = "default_base_flow_rate")]
    pub base_flow_rate: f64,
}

impl CrowdConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("crowdcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("capture.buffer_size", default_buffer_size() as i64)?
            .set_default("capture.overflow", "drop_oldest")?
            .set_default("capture.reconnect_attempts", default_reconnect_attempts())?
            .set_default("capture.reconnect_delay_ms", default_reconnect_delay_ms())?
            .set_default("capture.loop_files", false)?
            .set_default("capture.miss_backoff_ms", default_miss_backoff_ms())?
            .set_default("capture.error_backoff_ms", default_error_backoff_ms())?
            .set_default("capture.stop_timeout_ms", default_stop_timeout_ms())?
            .set_default(
                "capture.error_log_capacity",
                default_error_log_capacity() as i64,
            )?
            .set_default("pipeline.enable_smoothing", default_enable_smoothing())?
            .set_default(
                "pipeline.smoothing_window",
                default_smoothing_window() as i64,
            )?
            .set_default("pipeline.scale_factor", default_scale_factor())?
            .set_default("pipeline.area_sqm", default_area_sqm())?
            .set_default("pipeline.timing_history", default_timing_history() as i64)?
            .set_default("analyzer.zone_rows", default_zone_rows() as i64)?
            .set_default("analyzer.zone_cols", default_zone_cols() as i64)?
            .set_default("analyzer.base_flow_rate", default_base_flow_rate())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables, e.g. CROWDCAM_CAPTURE__BUFFER_SIZE
            .add_source(
                Environment::with_prefix("CROWDCAM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: CrowdConfig = settings.try_deserialize()?;

        info!(
            "Configuration loaded successfully ({} sources)",
            config.sources.len()
        );
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(ConfigError::Message(
                    "Source id must not be empty".to_string(),
                ));
            }
            if !seen.insert(source.id.as_str()) {
                return Err(ConfigError::Message(format!(
                    "Duplicate source id '{}'",
                    source.id
                )));
            }
            if source.descriptor.trim().is_empty() {
                return Err(ConfigError::Message(format!(
                    "Source '{}' has an empty descriptor",
                    source.id
                )));
            }
        }

        if self.capture.buffer_size == 0 {
            return Err(ConfigError::Message(
                "Capture buffer_size must be greater than 0".to_string(),
            ));
        }

        if self.capture.error_log_capacity == 0 {
            return Err(ConfigError::Message(
                "Capture error_log_capacity must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.enable_smoothing && self.pipeline.smoothing_window == 0 {
            return Err(ConfigError::Message(
                "Pipeline smoothing_window must be greater than 0 when smoothing is enabled"
                    .to_string(),
            ));
        }

        if self.pipeline.scale_factor <= 0.0 {
            return Err(ConfigError::Message(
                "Pipeline scale_factor must be greater than 0".to_string(),
            ));
        }

        self.pipeline
            .thresholds
            .validate()
            .map_err(|e| ConfigError::Message(format!("Pipeline thresholds: {}", e)))?;

        self.analyzer
            .thresholds
            .validate()
            .map_err(|e| ConfigError::Message(format!("Analyzer thresholds: {}", e)))?;

        if self.analyzer.zone_rows == 0 || self.analyzer.zone_cols == 0 {
            return Err(ConfigError::Message(
                "Analyzer zone grid must have at least one row and column".to_string(),
            ));
        }

        if self.analyzer.base_flow_rate <= 0.0 {
            return Err(ConfigError::Message(
                "Analyzer base_flow_rate must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Enabled sources only
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            overflow: default_overflow(),
            put_timeout_ms: None,
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            loop_files: false,
            miss_backoff_ms: default_miss_backoff_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
            error_log_capacity: default_error_log_capacity(),
            device_resolution: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            thresholds: LevelThresholds::four_tier(),
            enable_smoothing: default_enable_smoothing(),
            smoothing_window: default_smoothing_window(),
            scale_factor: default_scale_factor(),
            target_size: None,
            area_sqm: default_area_sqm(),
            timing_history: default_timing_history(),
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            thresholds: LevelThresholds::five_tier(),
            zone_rows: default_zone_rows(),
            zone_cols: default_zone_cols(),
            base_flow_rate: default_base_flow_rate(),
        }
    }
}

// Default value functions
fn default_area_sqm() -> f64 {
    100.0
}
fn default_enabled() -> bool {
    true
}

fn default_buffer_size() -> usize {
    5
}
fn default_overflow() -> OverflowPolicy {
    OverflowPolicy::DropOldest
}
fn default_reconnect_attempts() -> u32 {
    3
}
fn default_reconnect_delay_ms() -> u64 {
    1000
}
fn default_miss_backoff_ms() -> u64 {
    10
}
fn default_error_backoff_ms() -> u64 {
    100
}
fn default_stop_timeout_ms() -> u64 {
    2000
}
fn default_error_log_capacity() -> usize {
    100
}

fn default_enable_smoothing() -> bool {
    true
}
fn default_smoothing_window() -> usize {
    5
}
fn default_scale_factor() -> f64 {
    0.5
}
fn default_timing_history() -> usize {
    1000
}

fn default_zone_rows() -> usize {
    3
}
fn default_zone_cols() -> usize {
    3
}
fn default_base_flow_rate() -> f64 {
    1.5
}
