use super::status::{SourceStatus, WorkerCounters, WorkerState};
use crate::config::{CaptureConfig, SourceConfig};
use crate::error::{CaptureError, Result};
use crate::frame_channel::FrameChannel;
use crate::source::SourceAdapter;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Invoked with (source id, error) for every open failure and read fault
pub type ErrorCallback = Arc<dyn Fn(&str, &CaptureError) + Send + Sync>;

type SharedAdapter = Arc<AsyncMutex<Box<dyn SourceAdapter>>>;

/// Wait for an aborted task to unwind, then for the adapter lock
const FORCE_RELEASE_WAIT: Duration = Duration::from_millis(200);

/// Owns one source adapter and its frame channel, and runs the capture loop
/// on a dedicated task.
pub struct CaptureWorker {
    source: SourceConfig,
    settings: CaptureConfig,
    adapter: SharedAdapter,
    channel: Arc<FrameChannel>,
    counters: Arc<WorkerCounters>,
    on_error: Option<ErrorCallback>,
    state: Mutex<WorkerState>,
    cancel: Mutex<CancellationToken>,
    task: AsyncMutex<Option<JoinHandle<()>>>,
}

impl CaptureWorker {
    pub fn new(
        source: SourceConfig,
        settings: CaptureConfig,
        adapter: Box<dyn SourceAdapter>,
        on_error: Option<ErrorCallback>,
    ) -> Result<Self> {
        let channel = FrameChannel::new(settings.buffer_size, settings.overflow)?;

        Ok(Self {
            source,
            settings,
            adapter: Arc::new(AsyncMutex::new(adapter)),
            channel: Arc::new(channel),
            counters: Arc::new(WorkerCounters::default()),
            on_error,
            state: Mutex::new(WorkerState::Idle),
            cancel: Mutex::new(CancellationToken::new()),
            task: AsyncMutex::new(None),
        })
    }

    pub fn source_id(&self) -> &str {
        &self.source.id
    }

    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    pub fn channel(&self) -> Arc<FrameChannel> {
        Arc::clone(&self.channel)
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == WorkerState::Running
    }

    pub fn is_connected(&self) -> bool {
        self.counters.is_connected()
    }

    /// Snapshot of the worker counters; never blocks on the capture task
    pub fn status(&self) -> SourceStatus {
        self.counters
            .snapshot(&self.source.id, &self.source.name, self.state())
    }

    /// Spawn the capture loop. Starting a worker that is not idle is a no-op.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        {
            let mut state = self.state.lock();
            if *state != WorkerState::Idle {
                warn!("[{}] Capture worker is already running", self.source.id);
                return;
            }
            *state = WorkerState::Running;
        }

        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();

        info!("[{}] Starting capture worker", self.source.id);

        let context = LoopContext {
            source_id: self.source.id.clone(),
            adapter: Arc::clone(&self.adapter),
            channel: Arc::clone(&self.channel),
            counters: Arc::clone(&self.counters),
            on_error: self.on_error.clone(),
            cancel: token,
            put_timeout: self.settings.put_timeout(),
            miss_backoff: self.settings.miss_backoff(),
            error_backoff: self.settings.error_backoff(),
        };

        *task = Some(tokio::spawn(run_capture_loop(context)));
    }

    /// Signal the loop to exit and wait up to the configured stop timeout.
    ///
    /// The adapter is closed whether or not the loop exits in time; a loop
    /// stuck in a read is aborted first. Returns true on a clean exit.
    pub async fn stop(&self) -> bool {
        let handle = self.task.lock().await.take();
        let Some(mut handle) = handle else {
            *self.state.lock() = WorkerState::Idle;
            return true;
        };

        info!("[{}] Stopping capture worker", self.source.id);
        *self.state.lock() = WorkerState::Stopping;
        self.cancel.lock().cancel();

        let stop_timeout = self.settings.stop_timeout();
        let clean = match timeout(stop_timeout, &mut handle).await {
            Ok(Ok(())) => {
                debug!("[{}] Capture task exited", self.source.id);
                true
            }
            Ok(Err(e)) => {
                error!("[{}] Capture task failed: {}", self.source.id, e);
                false
            }
            Err(_) => {
                warn!(
                    "[{}] Capture task did not exit within {:?}, forcing release",
                    self.source.id, stop_timeout
                );
                handle.abort();
                let _ = timeout(FORCE_RELEASE_WAIT, handle).await;
                false
            }
        };

        match timeout(FORCE_RELEASE_WAIT, self.adapter.lock()).await {
            Ok(mut adapter) => adapter.close().await,
            Err(_) => warn!(
                "[{}] Adapter still busy after stop, release skipped",
                self.source.id
            ),
        }

        self.counters.set_connected(false);
        *self.state.lock() = WorkerState::Idle;
        info!("[{}] Capture worker stopped", self.source.id);
        clean
    }
}

// A worker dropped without `stop` still ends its loop, which closes the adapter
impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.cancel.lock().cancel();
    }
}

struct LoopContext {
    source_id: String,
    adapter: SharedAdapter,
    channel: Arc<FrameChannel>,
    counters: Arc<WorkerCounters>,
    on_error: Option<ErrorCallback>,
    cancel: CancellationToken,
    put_timeout: Option<Duration>,
    miss_backoff: Duration,
    error_backoff: Duration,
}

impl LoopContext {
    fn report(&self, error: &CaptureError) {
        self.counters.record_error(error);
        if let Some(callback) = &self.on_error {
            callback(&self.source_id, error);
        }
    }

    /// Sleep unless cancelled first; returns false on cancellation
    async fn backoff(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = sleep(duration) => true,
        }
    }
}

async fn run_capture_loop(ctx: LoopContext) {
    {
        let mut adapter = ctx.adapter.lock().await;
        let opened = tokio::select! {
            _ = ctx.cancel.cancelled() => None,
            result = adapter.open() => Some(result),
        };

        match opened {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                error!("[{}] Failed to open source: {}", ctx.source_id, e);
                ctx.report(&e);
                adapter.close().await;
                ctx.counters.set_connected(false);
                return;
            }
            None => {
                debug!("[{}] Cancelled while opening source", ctx.source_id);
                adapter.close().await;
                return;
            }
        }
    }

    ctx.counters.set_connected(true);
    info!("[{}] Capture loop running", ctx.source_id);

    while !ctx.cancel.is_cancelled() {
        let (outcome, still_open) = {
            let mut adapter = ctx.adapter.lock().await;
            tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                outcome = adapter.read() => (outcome, adapter.is_open()),
            }
        };

        match outcome {
            Ok(Some(frame)) => {
                let sequence = frame.sequence();
                ctx.counters
                    .record_frame(frame.metadata.timestamp, frame.metadata.fps);

                tokio::select! {
                    _ = ctx.cancel.cancelled() => break,
                    accepted = ctx.channel.put(frame, ctx.put_timeout) => {
                        if accepted {
                            trace!("[{}] Captured frame {}", ctx.source_id, sequence);
                        } else {
                            debug!(
                                "[{}] Frame {} not buffered, channel full",
                                ctx.source_id, sequence
                            );
                        }
                    }
                }
                tokio::task::yield_now().await;
            }
            Ok(None) => {
                ctx.counters.set_connected(still_open);
                if !ctx.backoff(ctx.miss_backoff).await {
                    break;
                }
            }
            Err(e) => {
                warn!("[{}] Read error: {}", ctx.source_id, e);
                ctx.report(&e);
                ctx.counters.set_connected(still_open);
                if !ctx.backoff(ctx.error_backoff).await {
                    break;
                }
            }
        }
    }

    ctx.adapter.lock().await.close().await;
    ctx.counters.set_connected(false);
    info!("[{}] Capture loop exited", ctx.source_id);
}
