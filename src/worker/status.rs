use crate::error::CaptureError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Lifecycle of a capture worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Running,
    Stopping,
}

/// Point-in-time view of one source, built from the worker's counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStatus {
    pub source_id: String,
    pub name: String,
    pub state: WorkerState,
    pub connected: bool,
    pub fps: f64,
    pub last_frame_time: Option<DateTime<Utc>>,
    pub frames_captured: u64,
    pub errors: u64,
    pub last_error: Option<String>,
}

/// Counters written by the capture task and read by status snapshots
#[derive(Debug, Default)]
pub(crate) struct WorkerCounters {
    frames_captured: AtomicU64,
    errors: AtomicU64,
    connected: AtomicBool,
    fps_bits: AtomicU64,
    last_frame_time: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
}

impl WorkerCounters {
    pub fn record_frame(&self, timestamp: DateTime<Utc>, fps: f64) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
        self.fps_bits.store(fps.to_bits(), Ordering::Relaxed);
        self.connected.store(true, Ordering::Relaxed);
        *self.last_frame_time.lock() = Some(timestamp);
    }

    pub fn record_error(&self, error: &CaptureError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(error.to_string());
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
        if !connected {
            self.fps_bits.store(0f64.to_bits(), Ordering::Relaxed);
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, source_id: &str, name: &str, state: WorkerState) -> SourceStatus {
        SourceStatus {
            source_id: source_id.to_string(),
            name: name.to_string(),
            state,
            connected: self.is_connected(),
            fps: f64::from_bits(self.fps_bits.load(Ordering::Relaxed)),
            last_frame_time: *self.last_frame_time.lock(),
            frames_captured: self.frames_captured(),
            errors: self.errors(),
            last_error: self.last_error.lock().clone(),
        }
    }
}
