use super::*;
use crate::config::{CaptureConfig, OverflowPolicy, SourceConfig};
use crate::error::CaptureError;
use crate::testing::{ScriptedAdapter, Step};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn create_source(id: &str) -> SourceConfig {
    SourceConfig::new(id, "0", "Test Gate", 50.0)
}

fn fast_settings() -> CaptureConfig {
    CaptureConfig {
        buffer_size: 3,
        miss_backoff_ms: 1,
        error_backoff_ms: 1,
        stop_timeout_ms: 500,
        ..Default::default()
    }
}

fn recording_callback() -> (ErrorCallback, Arc<Mutex<Vec<(String, CaptureError)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: ErrorCallback = Arc::new(move |id: &str, err: &CaptureError| {
        sink.lock().push((id.to_string(), err.clone()));
    });
    (callback, seen)
}

#[tokio::test]
async fn test_worker_captures_into_channel() {
    let adapter = ScriptedAdapter::streaming("cam_a", Duration::from_millis(2));
    let probe = adapter.probe();
    let worker =
        CaptureWorker::new(create_source("cam_a"), fast_settings(), Box::new(adapter), None)
            .unwrap();

    assert_eq!(worker.state(), WorkerState::Idle);
    worker.start().await;
    assert!(worker.is_running());

    let channel = worker.channel();
    let frame = channel.get(Some(Duration::from_secs(1))).await;
    assert!(frame.is_some());
    assert_eq!(frame.unwrap().source_id(), "cam_a");

    let status = worker.status();
    assert!(status.connected);
    assert!(status.frames_captured >= 1);
    assert!(status.last_frame_time.is_some());
    assert_eq!(status.name, "Test Gate");

    assert!(worker.stop().await);
    assert_eq!(worker.state(), WorkerState::Idle);
    assert!(!worker.status().connected);
    assert!(probe.closes() >= 1);
}

#[tokio::test]
async fn test_open_failure_reported_once() {
    let (callback, seen) = recording_callback();
    let adapter = ScriptedAdapter::failing_open("cam_b");
    let probe = adapter.probe();
    let worker = CaptureWorker::new(
        create_source("cam_b"),
        fast_settings(),
        Box::new(adapter),
        Some(callback),
    )
    .unwrap();

    worker.start().await;
    sleep(Duration::from_millis(50)).await;

    let status = worker.status();
    assert!(!status.connected);
    assert_eq!(status.errors, 1);
    assert_eq!(status.frames_captured, 0);
    assert!(status.last_error.is_some());
    assert_eq!(worker.channel().stats().frames_added, 0);
    assert_eq!(probe.opens(), 1);
    assert_eq!(probe.reads(), 0);

    let seen = seen.lock().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "cam_b");
    assert!(matches!(seen[0].1, CaptureError::Open { .. }));

    worker.stop().await;
}

#[tokio::test]
async fn test_read_faults_do_not_stop_loop() {
    let (callback, seen) = recording_callback();
    let adapter = ScriptedAdapter::scripted(
        "cam_c",
        vec![
            Step::Fault("decode error".to_string()),
            Step::Miss,
            Step::Fault("decode error".to_string()),
        ],
        Step::Frame,
    );
    let worker = CaptureWorker::new(
        create_source("cam_c"),
        fast_settings(),
        Box::new(adapter),
        Some(callback),
    )
    .unwrap();

    worker.start().await;
    let frame = worker.channel().get(Some(Duration::from_secs(1))).await;
    assert!(frame.is_some());

    let status = worker.status();
    assert_eq!(status.errors, 2);
    assert!(status.last_error.unwrap().contains("decode error"));
    assert_eq!(seen.lock().len(), 2);

    worker.stop().await;
}

#[tokio::test]
async fn test_stop_forces_release_of_hung_adapter() {
    let adapter = ScriptedAdapter::scripted("cam_d", vec![Step::Frame], Step::Hang);
    let probe = adapter.probe();
    let settings = CaptureConfig {
        stop_timeout_ms: 50,
        ..fast_settings()
    };
    let worker =
        CaptureWorker::new(create_source("cam_d"), settings, Box::new(adapter), None).unwrap();

    worker.start().await;
    assert!(worker.channel().get(Some(Duration::from_secs(1))).await.is_some());
    sleep(Duration::from_millis(20)).await;

    worker.stop().await;

    assert_eq!(worker.state(), WorkerState::Idle);
    assert!(probe.closes() >= 1);
    assert!(!worker.is_connected());
}

#[tokio::test]
async fn test_block_mode_stop_while_channel_full() {
    let adapter = ScriptedAdapter::streaming("cam_e", Duration::ZERO);
    let settings = CaptureConfig {
        buffer_size: 2,
        overflow: OverflowPolicy::Block,
        put_timeout_ms: None,
        ..fast_settings()
    };
    let worker =
        CaptureWorker::new(create_source("cam_e"), settings, Box::new(adapter), None).unwrap();

    worker.start().await;
    sleep(Duration::from_millis(30)).await;

    let channel = worker.channel();
    assert!(channel.is_full());
    assert_eq!(channel.stats().frames_dropped, 0);

    assert!(worker.stop().await);
}

#[tokio::test]
async fn test_restart_after_stop() {
    let adapter = ScriptedAdapter::streaming("cam_f", Duration::from_millis(2));
    let probe = adapter.probe();
    let worker =
        CaptureWorker::new(create_source("cam_f"), fast_settings(), Box::new(adapter), None)
            .unwrap();

    worker.start().await;
    worker.start().await;
    worker.stop().await;

    worker.start().await;
    assert!(worker.channel().get(Some(Duration::from_secs(1))).await.is_some());
    worker.stop().await;

    assert_eq!(probe.opens(), 2);
}

#[tokio::test]
async fn test_stop_idle_worker_is_noop() {
    let adapter = ScriptedAdapter::streaming("cam_g", Duration::ZERO);
    let worker =
        CaptureWorker::new(create_source("cam_g"), fast_settings(), Box::new(adapter), None)
            .unwrap();

    assert!(worker.stop().await);
    assert_eq!(worker.state(), WorkerState::Idle);
}

#[test]
fn test_zero_buffer_rejected() {
    let settings = CaptureConfig {
        buffer_size: 0,
        ..Default::default()
    };
    let adapter = ScriptedAdapter::streaming("cam_h", Duration::ZERO);
    assert!(CaptureWorker::new(create_source("cam_h"), settings, Box::new(adapter), None).is_err());
}

#[test]
fn test_status_serializes() {
    let adapter = ScriptedAdapter::streaming("cam_i", Duration::ZERO);
    let worker =
        CaptureWorker::new(create_source("cam_i"), fast_settings(), Box::new(adapter), None)
            .unwrap();

    let json = serde_json::to_value(worker.status()).unwrap();
    assert_eq!(json["source_id"], "cam_i");
    assert_eq!(json["state"], "idle");
    assert_eq!(json["connected"], false);
    assert!(json["last_frame_time"].is_null());
}

#[tokio::test]
async fn test_dropped_worker_stops_capturing() {
    let adapter = ScriptedAdapter::streaming("cam_drop", Duration::from_millis(2));
    let probe = adapter.probe();
    let worker = CaptureWorker::new(
        create_source("cam_drop"),
        fast_settings(),
        Box::new(adapter),
        None,
    )
    .unwrap();

    worker.start().await;
    let channel = worker.channel();
    assert!(channel.get(Some(Duration::from_secs(1))).await.is_some());

    drop(worker);
    sleep(Duration::from_millis(50)).await;
    let added = channel.stats().frames_added;
    sleep(Duration::from_millis(50)).await;

    assert_eq!(channel.stats().frames_added, added);
    assert_eq!(probe.closes(), 1);
}

#[tokio::test]
async fn test_stop_during_slow_open() {
    let adapter = ScriptedAdapter::streaming("cam_slow", Duration::from_millis(2))
        .with_open_delay(Duration::from_secs(3600));
    let probe = adapter.probe();
    let worker = CaptureWorker::new(
        create_source("cam_slow"),
        fast_settings(),
        Box::new(adapter),
        None,
    )
    .unwrap();

    worker.start().await;
    sleep(Duration::from_millis(20)).await;
    assert_eq!(probe.opens(), 1);

    assert!(worker.stop().await);
    assert!(probe.closes() >= 1);
    assert!(!worker.is_connected());
    assert_eq!(worker.channel().stats().frames_added, 0);
}
