//! Integration tests for the announce supervisor over a real UDP socket.
//!
//! A wrapper advertiser fails the first attempts and then delegates to
//! `UdpAnnouncer`, which broadcasts to a localhost receiver.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use huesync_server::application::announce::{
    AdvertiseHandle, Advertiser, AnnounceSupervisor, RetryPolicy, ServiceMetadata, TransportError,
};
use huesync_server::infrastructure::network::announcer::UdpAnnouncer;
use tokio::net::UdpSocket;
use tokio::sync::watch;

struct FailFirst {
    remaining: AtomicU32,
    inner: UdpAnnouncer,
}

#[async_trait]
impl Advertiser for FailFirst {
    async fn advertise(&self, metadata: &ServiceMetadata) -> Result<AdvertiseHandle, TransportError> {
        if self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(TransportError::Advertise("network unreachable".into()));
        }
        self.inner.advertise(metadata).await
    }

    async fn end_advertise(&self, handle: AdvertiseHandle) -> Result<(), TransportError> {
        self.inner.end_advertise(handle).await
    }

    async fn destroy(&self) {
        self.inner.destroy().await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_supervisor_recovers_and_broadcasts_metadata() {
    // Arrange
    let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let target = receiver.local_addr().unwrap();
    let advertiser = Arc::new(FailFirst {
        remaining: AtomicU32::new(3),
        inner: UdpAnnouncer::new(target, Duration::from_millis(50)),
    });
    let retry = RetryPolicy {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
    };
    let metadata = ServiceMetadata::new("Hue HDMI Sync", "hue-hdmi-sync", 8080);
    let supervisor = AnnounceSupervisor::new(advertiser.clone(), metadata.clone(), retry);
    let (tx, rx) = watch::channel(false);

    // Act
    let task = tokio::spawn(async move { supervisor.run(rx).await });
    let mut buf = vec![0u8; 2048];
    let (len, _) = tokio::time::timeout(Duration::from_secs(5), receiver.recv_from(&mut buf))
        .await
        .expect("announcement within 5s")
        .unwrap();
    tx.send(true).unwrap();
    let attempts = task.await.unwrap();

    // Assert
    let received: ServiceMetadata = serde_json::from_slice(&buf[..len]).unwrap();
    assert_eq!(received, metadata);
    assert_eq!(attempts, 4);
    assert_eq!(advertiser.inner.active_count().await, 0, "shutdown must end the advertisement");
}
