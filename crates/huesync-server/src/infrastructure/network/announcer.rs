//! UDP broadcast service announcer.
//!
//! Each advertisement is a background task that sends the service metadata
//! as one JSON datagram to the broadcast target, immediately and then once
//! per interval, until ended:
//!
//! ```json
//! {"name":"Hue HDMI Sync","type":"hue-hdmi-sync","port":8080,"txt":{"url":"https://..."}}
//! ```
//!
//! The first datagram is sent before `advertise` returns, so a network that
//! cannot send at all is reported as a failure to the announce supervisor.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::announce::{AdvertiseHandle, Advertiser, ServiceMetadata, TransportError};

struct Advertisement {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Advertises the service by periodic UDP broadcast.
pub struct UdpAnnouncer {
    target: SocketAddr,
    interval: Duration,
    active: Mutex<HashMap<AdvertiseHandle, Advertisement>>,
}

impl UdpAnnouncer {
    pub fn new(target: SocketAddr, interval: Duration) -> Self {
        Self {
            target,
            interval,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live advertisements.
    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }
}

#[async_trait]
impl Advertiser for UdpAnnouncer {
    async fn advertise(&self, metadata: &ServiceMetadata) -> Result<AdvertiseHandle, TransportError> {
        let payload =
            serde_json::to_vec(metadata).map_err(|e| TransportError::Advertise(e.to_string()))?;
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| TransportError::Advertise(format!("bind: {e}")))?;
        socket
            .set_broadcast(true)
            .map_err(|e| TransportError::Advertise(format!("set_broadcast: {e}")))?;
        socket
            .send_to(&payload, self.target)
            .await
            .map_err(|e| TransportError::Advertise(format!("send to {}: {e}", self.target)))?;

        let (stop, mut stopped) = oneshot::channel();
        let target = self.target;
        let period = self.interval.max(Duration::from_millis(1));
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        if let Err(e) = socket.send_to(&payload, target).await {
                            warn!("announce send to {target} failed: {e}");
                        }
                    }
                }
            }
            debug!("announce task for {target} ended");
        });

        let handle = AdvertiseHandle::new();
        self.active.lock().await.insert(handle, Advertisement { stop, task });
        info!("advertising {} on UDP {}", metadata.name, self.target);
        Ok(handle)
    }

    async fn end_advertise(&self, handle: AdvertiseHandle) -> Result<(), TransportError> {
        let Some(ad) = self.active.lock().await.remove(&handle) else {
            debug!("end_advertise for unknown handle {:?}", handle.0);
            return Ok(());
        };
        // The task may already have exited; a closed channel is fine.
        let _ = ad.stop.send(());
        ad.task
            .await
            .map_err(|e| TransportError::Advertise(format!("announce task failed: {e}")))
    }

    async fn destroy(&self) {
        let handles: Vec<AdvertiseHandle> = self.active.lock().await.keys().copied().collect();
        for handle in handles {
            if let Err(e) = self.end_advertise(handle).await {
                warn!("ending advertisement during destroy failed: {e}");
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn receiver() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    async fn recv_metadata(socket: &UdpSocket) -> ServiceMetadata {
        let mut buf = vec![0u8; 2048];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("datagram within 2s")
            .unwrap();
        serde_json::from_slice(&buf[..len]).unwrap()
    }

    #[tokio::test]
    async fn test_advertise_sends_metadata_immediately_and_repeats() {
        // Arrange
        let (rx, addr) = receiver().await;
        let announcer = UdpAnnouncer::new(addr, Duration::from_millis(20));
        let metadata = ServiceMetadata::new("Hue HDMI Sync", "hue-hdmi-sync", 8080)
            .with_url("https://example.test");

        // Act
        let handle = announcer.advertise(&metadata).await.unwrap();
        let first = recv_metadata(&rx).await;
        let second = recv_metadata(&rx).await;

        // Assert
        assert_eq!(first, metadata);
        assert_eq!(second, metadata);
        announcer.end_advertise(handle).await.unwrap();
        assert_eq!(announcer.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_end_advertise_unknown_handle_is_ok() {
        let (_rx, addr) = receiver().await;
        let announcer = UdpAnnouncer::new(addr, Duration::from_secs(1));

        assert!(announcer.end_advertise(AdvertiseHandle::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_destroy_ends_every_advertisement() {
        let (_rx, addr) = receiver().await;
        let announcer = UdpAnnouncer::new(addr, Duration::from_secs(1));
        let metadata = ServiceMetadata::new("a", "b", 1);
        announcer.advertise(&metadata).await.unwrap();
        announcer.advertise(&metadata).await.unwrap();

        announcer.destroy().await;

        assert_eq!(announcer.active_count().await, 0);
    }
}
