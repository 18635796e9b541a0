use crate::config::OverflowPolicy;
use crate::error::{CrowdError, Result};
use crate::frame::BufferedFrame;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Bounded FIFO hand-off between one capture worker and its consumers.
///
/// The queue itself sits behind a short-lived `parking_lot` lock; waiting for
/// data or space happens on `Notify` handles so timed `get`/`put` never hold
/// the lock while parked.
pub struct FrameChannel {
    inner: Mutex<ChannelState>,
    capacity: usize,
    policy: OverflowPolicy,
    not_empty: Notify,
    not_full: Notify,
}

struct ChannelState {
    frames: VecDeque<BufferedFrame>,
    frames_added: u64,
    frames_dropped: u64,
}

/// Snapshot of channel counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStats {
    pub current_size: usize,
    pub capacity: usize,
    pub frames_added: u64,
    pub frames_dropped: u64,
    pub drop_rate: f64,
}

impl FrameChannel {
    /// Create a channel holding at most `capacity` frames.
    ///
    /// # Example
    /// ```
    /// use crowdcam::config::OverflowPolicy;
    /// use crowdcam::frame_channel::FrameChannel;
    ///
    /// let channel = FrameChannel::new(5, OverflowPolicy::DropOldest).unwrap();
    /// assert!(channel.is_empty());
    /// ```
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Result<Self> {
        if capacity == 0 {
            return Err(CrowdError::system(
                "Frame channel capacity must be greater than 0",
            ));
        }

        debug!(
            "Created frame channel with capacity {} ({:?})",
            capacity, policy
        );

        Ok(Self {
            inner: Mutex::new(ChannelState {
                frames: VecDeque::with_capacity(capacity),
                frames_added: 0,
                frames_dropped: 0,
            }),
            capacity,
            policy,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        })
    }

    /// Add a frame.
    ///
    /// In drop-oldest mode this never waits: a full channel evicts its oldest
    /// frame and always returns `true`. In block mode it waits for space for
    /// at most `timeout` (forever when `None`) and returns `false` on timeout,
    /// in which case the frame is discarded.
    pub async fn put(&self, frame: BufferedFrame, timeout: Option<Duration>) -> bool {
        match self.policy {
            OverflowPolicy::DropOldest => {
                self.push_evicting(frame);
                true
            }
            OverflowPolicy::Block => self.put_blocking(frame, timeout).await,
        }
    }

    fn push_evicting(&self, frame: BufferedFrame) {
        {
            let mut state = self.inner.lock();
            if state.frames.len() >= self.capacity {
                if let Some(evicted) = state.frames.pop_front() {
                    state.frames_dropped += 1;
                    trace!(
                        "Evicted frame {} from {} channel",
                        evicted.metadata.sequence,
                        evicted.metadata.source_id
                    );
                }
            }
            state.frames.push_back(frame);
            state.frames_added += 1;
        }
        self.not_empty.notify_one();
    }

    async fn put_blocking(&self, frame: BufferedFrame, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut pending = Some(frame);

        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.inner.lock();
                if state.frames.len() < self.capacity {
                    if let Some(frame) = pending.take() {
                        state.frames.push_back(frame);
                        state.frames_added += 1;
                    }
                    drop(state);
                    self.not_empty.notify_one();
                    return true;
                }
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        trace!("Timed out waiting for channel space");
                        return false;
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Remove the oldest frame, waiting at most `timeout` (forever when `None`).
    pub async fn get(&self, timeout: Option<Duration>) -> Option<BufferedFrame> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(frame) = self.try_get() {
                return Some(frame);
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return self.try_get();
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Remove the oldest frame without waiting.
    pub fn try_get(&self) -> Option<BufferedFrame> {
        let frame = self.inner.lock().frames.pop_front();
        if frame.is_some() {
            self.not_full.notify_one();
        }
        frame
    }

    /// Return the newest frame and discard everything older, atomically.
    ///
    /// Discarded frames count as dropped.
    pub fn get_latest(&self) -> Option<BufferedFrame> {
        let latest = {
            let mut state = self.inner.lock();
            let latest = state.frames.pop_back()?;
            let skipped = state.frames.len() as u64;
            state.frames.clear();
            state.frames_dropped += skipped;
            latest
        };

        self.not_full.notify_waiters();
        Some(latest)
    }

    /// Clear all frames from the channel
    pub fn clear(&self) {
        self.inner.lock().frames.clear();
        self.not_full.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn stats(&self) -> ChannelStats {
        let state = self.inner.lock();
        ChannelStats {
            current_size: state.frames.len(),
            capacity: self.capacity,
            frames_added: state.frames_added,
            frames_dropped: state.frames_dropped,
            drop_rate: state.frames_dropped as f64 / state.frames_added.max(1) as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameMetadata;
    use chrono::Utc;
    use image::RgbImage;
    use std::sync::Arc;

    fn create_test_frame(sequence: u64) -> BufferedFrame {
        BufferedFrame::new(
            RgbImage::new(8, 8),
            FrameMetadata {
                timestamp: Utc::now(),
                sequence,
                source_id: "test".to_string(),
                resolution: (8, 8),
                fps: 30.0,
            },
        )
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(FrameChannel::new(0, OverflowPolicy::DropOldest).is_err());
    }

    #[tokio::test]
    async fn test_drop_oldest_keeps_most_recent() {
        let channel = FrameChannel::new(3, OverflowPolicy::DropOldest).unwrap();

        for sequence in 1..=7 {
            assert!(channel.put(create_test_frame(sequence), None).await);
        }

        let stats = channel.stats();
        assert_eq!(stats.current_size, 3);
        assert_eq!(stats.frames_added, 7);
        assert_eq!(stats.frames_dropped, 4);

        let survivors: Vec<u64> = std::iter::from_fn(|| channel.try_get())
            .map(|f| f.sequence())
            .collect();
        assert_eq!(survivors, vec![5, 6, 7]);
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let channel = FrameChannel::new(10, OverflowPolicy::DropOldest).unwrap();
        for sequence in 1..=4 {
            channel.put(create_test_frame(sequence), None).await;
        }

        for expected in 1..=4 {
            let frame = channel.get(Some(Duration::from_millis(10))).await.unwrap();
            assert_eq!(frame.sequence(), expected);
        }
    }

    #[tokio::test]
    async fn test_get_times_out_on_empty_channel() {
        let channel = FrameChannel::new(2, OverflowPolicy::DropOldest).unwrap();
        let started = Instant::now();

        assert!(channel.get(Some(Duration::from_millis(30))).await.is_none());
        assert!(started.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn test_get_latest() {
        let channel = FrameChannel::new(5, OverflowPolicy::DropOldest).unwrap();
        assert!(channel.get_latest().is_none());

        for sequence in 1..=3 {
            channel.put(create_test_frame(sequence), None).await;
        }

        let latest = channel.get_latest().unwrap();
        assert_eq!(latest.sequence(), 3);
        assert!(channel.is_empty());
        assert_eq!(channel.stats().frames_dropped, 2);
        assert!(channel.get_latest().is_none());
    }

    #[tokio::test]
    async fn test_block_mode_put_times_out_when_full() {
        let channel = FrameChannel::new(2, OverflowPolicy::Block).unwrap();

        assert!(channel.put(create_test_frame(1), None).await);
        assert!(channel.put(create_test_frame(2), None).await);
        assert!(channel.is_full());

        let accepted = channel
            .put(create_test_frame(3), Some(Duration::from_millis(20)))
            .await;
        assert!(!accepted);

        let stats = channel.stats();
        assert_eq!(stats.current_size, 2);
        assert_eq!(stats.frames_added, 2);
        assert_eq!(stats.frames_dropped, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_block_mode_put_resumes_when_space_frees() {
        let channel = Arc::new(FrameChannel::new(1, OverflowPolicy::Block).unwrap());
        channel.put(create_test_frame(1), None).await;

        let producer = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move {
                channel
                    .put(create_test_frame(2), Some(Duration::from_secs(2)))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let first = channel.get(Some(Duration::from_millis(100))).await.unwrap();
        assert_eq!(first.sequence(), 1);

        assert!(producer.await.unwrap());
        let second = channel.get(Some(Duration::from_millis(500))).await.unwrap();
        assert_eq!(second.sequence(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consumers_never_see_a_frame_twice() {
        let channel = Arc::new(FrameChannel::new(500, OverflowPolicy::DropOldest).unwrap());

        let producer = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move {
                for sequence in 1..=200 {
                    channel.put(create_test_frame(sequence), None).await;
                    if sequence % 20 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        };

        let mut consumers = Vec::new();
        for _ in 0..3 {
            let channel = Arc::clone(&channel);
            consumers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(frame) = channel.get(Some(Duration::from_millis(100))).await {
                    seen.push(frame.sequence());
                }
                seen
            }));
        }

        producer.await.unwrap();
        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }

        all.sort_unstable();
        let expected: Vec<u64> = (1..=200).collect();
        assert_eq!(all, expected);
    }

    #[tokio::test]
    async fn test_drop_rate() {
        let channel = FrameChannel::new(1, OverflowPolicy::DropOldest).unwrap();
        assert_eq!(channel.stats().drop_rate, 0.0);

        for sequence in 1..=4 {
            channel.put(create_test_frame(sequence), None).await;
        }
        assert_eq!(channel.stats().drop_rate, 0.75);

        channel.clear();
        assert!(channel.is_empty());
        assert_eq!(channel.capacity(), 1);
    }
}
