mod error_log;

pub use error_log::{ErrorLog, ErrorRecord};

use crate::config::{CaptureConfig, CrowdConfig, SourceConfig};
use crate::error::{CaptureError, CrowdError, Result};
use crate::frame::BufferedFrame;
use crate::frame_channel::ChannelStats;
use crate::source::{default_factory, AdapterFactory};
use crate::worker::{CaptureWorker, ErrorCallback, SourceStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Runs one capture worker per enabled source and aggregates their state.
///
/// Disabled sources are kept for configuration lookups but never get a
/// worker or adapter. Lookups for unknown or disabled ids return `None`.
pub struct SourceOrchestrator {
    sources: Vec<SourceConfig>,
    workers: Vec<Arc<CaptureWorker>>,
    index: HashMap<String, usize>,
    error_log: Arc<ErrorLog>,
}

impl SourceOrchestrator {
    /// Build workers using the compiled-in capture backend
    pub fn from_config(config: &CrowdConfig) -> Result<Self> {
        Self::new(config.sources.clone(), config.capture.clone(), default_factory())
    }

    pub fn new(
        sources: Vec<SourceConfig>,
        capture: CaptureConfig,
        factory: AdapterFactory,
    ) -> Result<Self> {
        let error_log = Arc::new(ErrorLog::new(capture.error_log_capacity));

        let log = Arc::clone(&error_log);
        let on_error: ErrorCallback = Arc::new(move |source_id: &str, err: &CaptureError| {
            error!("[{}] Capture error: {}", source_id, err);
            log.push(source_id.to_string(), err.to_string());
        });

        let mut workers = Vec::new();
        let mut index = HashMap::new();
        for source in sources.iter().filter(|s| s.enabled) {
            if index.contains_key(&source.id) {
                return Err(CrowdError::component(
                    "orchestrator",
                    format!("duplicate source id '{}'", source.id).as_str(),
                ));
            }
            let adapter = factory(source, &capture);
            let worker = CaptureWorker::new(
                source.clone(),
                capture.clone(),
                adapter,
                Some(Arc::clone(&on_error)),
            )?;
            index.insert(source.id.clone(), workers.len());
            workers.push(Arc::new(worker));
        }

        let disabled = sources.len() - workers.len();
        info!(
            "Source orchestrator configured with {} workers ({} disabled)",
            workers.len(),
            disabled
        );

        Ok(Self {
            sources,
            workers,
            index,
            error_log,
        })
    }

    fn worker(&self, source_id: &str) -> Option<&Arc<CaptureWorker>> {
        self.index.get(source_id).map(|&i| &self.workers[i])
    }

    /// Start every worker. Open failures surface through status and the
    /// error log rather than as an error here.
    pub async fn start(&self) {
        for worker in &self.workers {
            worker.start().await;
        }
        info!("Started {} capture workers", self.workers.len());
    }

    /// Stop every worker concurrently, each bounded by the stop timeout
    pub async fn stop(&self) {
        let mut stops = JoinSet::new();
        for worker in &self.workers {
            let worker = Arc::clone(worker);
            stops.spawn(async move {
                let clean = worker.stop().await;
                (worker.source_id().to_string(), clean)
            });
        }

        while let Some(joined) = stops.join_next().await {
            match joined {
                Ok((source_id, false)) => {
                    warn!("[{}] Worker did not stop cleanly", source_id)
                }
                Ok(_) => {}
                Err(e) => error!("Worker stop task failed: {}", e),
            }
        }

        info!("All capture workers stopped");
    }

    /// Next frame from one source, waiting up to `timeout`
    pub async fn get_frame(
        &self,
        source_id: &str,
        timeout: Option<Duration>,
    ) -> Option<BufferedFrame> {
        let channel = self.worker(source_id)?.channel();
        channel.get(timeout).await
    }

    /// Newest buffered frame for one source, discarding older ones
    pub fn get_latest_frame(&self, source_id: &str) -> Option<BufferedFrame> {
        self.worker(source_id)?.channel().get_latest()
    }

    /// Newest buffered frame for every source that has one
    pub fn get_latest_frames(&self) -> HashMap<String, BufferedFrame> {
        self.workers
            .iter()
            .filter_map(|worker| {
                worker
                    .channel()
                    .get_latest()
                    .map(|frame| (worker.source_id().to_string(), frame))
            })
            .collect()
    }

    pub fn status(&self, source_id: &str) -> Option<SourceStatus> {
        self.worker(source_id).map(|worker| worker.status())
    }

    pub fn get_status(&self) -> HashMap<String, SourceStatus> {
        self.workers
            .iter()
            .map(|worker| (worker.source_id().to_string(), worker.status()))
            .collect()
    }

    /// Ids of sources currently delivering frames, in configuration order
    pub fn active_sources(&self) -> Vec<String> {
        self.workers
            .iter()
            .filter(|worker| worker.is_connected())
            .map(|worker| worker.source_id().to_string())
            .collect()
    }

    /// Configuration of any configured source, enabled or not
    pub fn source_config(&self, source_id: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id == source_id)
    }

    pub fn buffer_stats(&self, source_id: &str) -> Option<ChannelStats> {
        self.worker(source_id).map(|worker| worker.channel().stats())
    }

    pub fn error_log(&self) -> Vec<ErrorRecord> {
        self.error_log.snapshot()
    }

    pub fn last_error(&self, source_id: &str) -> Option<ErrorRecord> {
        self.error_log.last_for(source_id)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.workers
            .iter()
            .map(|worker| worker.source_id().to_string())
            .collect()
    }
}
