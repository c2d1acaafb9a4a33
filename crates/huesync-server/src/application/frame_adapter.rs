//! Frame channel and the adapter that forwards frames to the bridge.
//!
//! Producers publish flat `[r, g, b, r, g, b, ...]` frames into a latest-wins
//! channel.  The adapter is the channel's only consumer.  For each frame it:
//!
//! 1. checks the session gate (non-waiting; closed unless `working`),
//! 2. splits the frame into colour triples,
//! 3. hands the triples to [`BridgeConnectionManager::transition`].
//!
//! Frames that fail any step are dropped and counted.  A malformed frame is
//! a producer bug: it is logged at debug level and never changes session
//! status.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use huesync_core::chunk_frame;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, trace};

use super::bridge_manager::{BridgeConnectionManager, FrameDelivery};
use super::session_store::SessionStore;

/// Producer side of the frame channel.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: watch::Sender<Vec<u8>>,
}

/// Consumer side of the frame channel.
pub type FrameReceiver = watch::Receiver<Vec<u8>>;

/// Creates a frame channel.  Only the newest unread frame is kept.
pub fn frame_channel() -> (FrameSender, FrameReceiver) {
    let (tx, rx) = watch::channel(Vec::new());
    (FrameSender { tx }, rx)
}

impl FrameSender {
    /// Publishes a frame, replacing any frame the adapter has not read yet.
    ///
    /// Returns `false` once the adapter has gone away.
    pub fn publish(&self, frame: Vec<u8>) -> bool {
        self.tx.send(frame).is_ok()
    }
}

/// Result of handling one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Delivered,
    /// Session not `working`.
    Gated,
    Malformed,
    Undeliverable(FrameDelivery),
}

/// Running counters, readable while the adapter runs.
#[derive(Debug, Default)]
pub struct AdapterStats {
    delivered: AtomicU64,
    gated: AtomicU64,
    malformed: AtomicU64,
    undeliverable: AtomicU64,
}

/// Point-in-time copy of [`AdapterStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdapterStatsSnapshot {
    pub delivered: u64,
    pub gated: u64,
    pub malformed: u64,
    pub undeliverable: u64,
}

impl AdapterStats {
    pub fn snapshot(&self) -> AdapterStatsSnapshot {
        AdapterStatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            gated: self.gated.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            undeliverable: self.undeliverable.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: FrameOutcome) {
        let counter = match outcome {
            FrameOutcome::Delivered => &self.delivered,
            FrameOutcome::Gated => &self.gated,
            FrameOutcome::Malformed => &self.malformed,
            FrameOutcome::Undeliverable(_) => &self.undeliverable,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Consumes the frame channel and pushes frames to the bridge.
pub struct FrameChannelAdapter {
    session: Arc<SessionStore>,
    bridge: Arc<BridgeConnectionManager>,
    stats: AdapterStats,
}

impl FrameChannelAdapter {
    pub fn new(session: Arc<SessionStore>, bridge: Arc<BridgeConnectionManager>) -> Self {
        Self {
            session,
            bridge,
            stats: AdapterStats::default(),
        }
    }

    pub fn stats(&self) -> AdapterStatsSnapshot {
        self.stats.snapshot()
    }

    /// Handles one frame.  Never blocks on a session transition or a
    /// bridge handshake.
    pub fn handle_frame(&self, frame: &[u8]) -> FrameOutcome {
        let outcome = self.forward(frame);
        self.stats.record(outcome);
        outcome
    }

    fn forward(&self, frame: &[u8]) -> FrameOutcome {
        if !self.session.is_streaming_now() {
            trace!("session not streaming; frame of {} values dropped", frame.len());
            return FrameOutcome::Gated;
        }

        let colors = match chunk_frame(frame) {
            Ok(colors) => colors,
            Err(e) => {
                debug!("dropping frame: {e}");
                return FrameOutcome::Malformed;
            }
        };

        match self.bridge.transition(&colors) {
            FrameDelivery::Sent => FrameOutcome::Delivered,
            other => FrameOutcome::Undeliverable(other),
        }
    }

    /// Processes frames until every [`FrameSender`] is dropped.
    pub async fn run(self: Arc<Self>, mut rx: FrameReceiver) {
        info!("frame adapter running");
        while rx.changed().await.is_ok() {
            let frame = rx.borrow_and_update().clone();
            self.handle_frame(&frame);
        }
        let stats = self.stats();
        info!(
            "frame adapter stopped (delivered={}, gated={}, malformed={}, undeliverable={})",
            stats.delivered, stats.gated, stats.malformed, stats.undeliverable
        );
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::bridge_manager::BridgeTimings;
    use crate::infrastructure::bridge::simulated::SimulatedBridge;
    use huesync_core::{BridgeIdentity, ColorTriple, Credentials, ManualClock, SessionStatus};

    struct Fixture {
        adapter: Arc<FrameChannelAdapter>,
        session: Arc<SessionStore>,
        bridge: Arc<BridgeConnectionManager>,
        device: SimulatedBridge,
    }

    fn fixture() -> Fixture {
        let device = SimulatedBridge::demo();
        let session = Arc::new(SessionStore::new());
        let bridge = Arc::new(BridgeConnectionManager::new(
            Arc::new(device.clone()),
            Arc::new(ManualClock::new()),
            BridgeTimings::default(),
        ));
        let adapter = Arc::new(FrameChannelAdapter::new(session.clone(), bridge.clone()));
        Fixture {
            adapter,
            session,
            bridge,
            device,
        }
    }

    async fn start_streaming(f: &Fixture) {
        let identity = BridgeIdentity::new("b1", "127.0.0.1");
        let creds = Credentials::new("k", "u");
        f.session
            .apply(|s| s.attach_bridge(identity.clone(), creds.clone()))
            .await
            .unwrap();
        f.bridge.open(&identity, &creds).await.unwrap();
        f.bridge.start_streaming("1").await.unwrap();
        f.session.apply(|s| s.begin_stream("1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_frames_are_gated_when_not_working() {
        let f = fixture();

        for _ in 0..5 {
            assert_eq!(f.adapter.handle_frame(&[1, 2, 3]), FrameOutcome::Gated);
        }

        assert_eq!(f.device.transition_count(), 0);
        assert_eq!(f.adapter.stats().gated, 5);
    }

    #[tokio::test]
    async fn test_well_formed_frame_is_delivered_as_triples() {
        let f = fixture();
        start_streaming(&f).await;

        let outcome = f.adapter.handle_frame(&[255, 0, 0, 0, 255, 0]);

        assert_eq!(outcome, FrameOutcome::Delivered);
        assert_eq!(
            f.device.frames(),
            vec![vec![ColorTriple(255, 0, 0), ColorTriple(0, 255, 0)]]
        );
    }

    #[tokio::test]
    async fn test_malformed_frame_is_dropped_without_failing_session() {
        let f = fixture();
        start_streaming(&f).await;

        let outcome = f.adapter.handle_frame(&[1, 2, 3, 4]);

        assert_eq!(outcome, FrameOutcome::Malformed);
        assert_eq!(f.device.transition_count(), 0);
        assert_eq!(f.session.status().await, SessionStatus::Working);
        assert_eq!(f.adapter.stats().malformed, 1);
    }

    #[tokio::test]
    async fn test_empty_frame_is_delivered_as_empty() {
        let f = fixture();
        start_streaming(&f).await;

        assert_eq!(f.adapter.handle_frame(&[]), FrameOutcome::Delivered);
        assert_eq!(f.device.frames(), vec![Vec::<ColorTriple>::new()]);
    }

    #[tokio::test]
    async fn test_run_drains_channel_until_sender_dropped() {
        // Arrange
        let f = fixture();
        start_streaming(&f).await;
        let (tx, rx) = frame_channel();
        let task = tokio::spawn(f.adapter.clone().run(rx));

        // Act
        assert!(tx.publish(vec![10, 20, 30]));
        tokio::task::yield_now().await;
        drop(tx);
        task.await.unwrap();

        // Assert
        let frames = f.device.frames();
        assert!(!frames.is_empty());
        assert_eq!(frames.last(), Some(&vec![ColorTriple(10, 20, 30)]));
    }

    #[test]
    fn test_publish_keeps_only_latest_frame() {
        let (tx, mut rx) = frame_channel();

        tx.publish(vec![1, 1, 1]);
        tx.publish(vec![2, 2, 2]);

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), vec![2, 2, 2]);
    }
}
