//! BridgeConnectionManager: owns the single live bridge connection.
//!
//! # Connection lifecycle
//!
//! ```text
//!   (none) ──open──► Open ──start_streaming(area)──► Streaming
//!     ▲                                                  │
//!     │                 quiesce interval                 │ stop_streaming
//!     └──────────────── (Busy until elapsed) ◄───────────┘   (closes)
//! ```
//!
//! At most one connection exists at a time and no other component ever holds
//! a reference to it.  All handshake operations (`open`, `start_streaming`,
//! `stop_streaming`, `close`) are serialized through one async mutex and are
//! bounded by the configured I/O timeout.
//!
//! # Frame delivery
//!
//! [`BridgeConnectionManager::transition`] runs on the frame delivery path.
//! It only *tries* the mutex: if a handshake is in flight the frame is
//! dropped instead of waiting, so a frame can never reach a connection that
//! is half-stopped or not yet started.
//!
//! Area listing never touches the held connection.  It opens a short-lived
//! connection of its own, so a listing neither blocks frames nor waits out
//! the quiesce interval.
//!
//! # Quiesce interval
//!
//! After a stream stops, the device-side socket needs time to settle before
//! the bridge accepts a new stream.  The manager records the instant the
//! interval ends and rejects stream `open` / `start_streaming` with
//! [`ControlError::Busy`] until then, reporting how long to wait.  The
//! default is 500 ms, an observed value rather than a vendor-documented one.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use huesync_core::{BridgeIdentity, Clock, ColorTriple, ControlError, Credentials};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use super::bridge_client::{BridgeClient, BridgeClientError, BridgeConnection, EntertainmentArea};

/// Default bound on each device handshake operation.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Default settling time after a stream stops.
pub const DEFAULT_QUIESCE: Duration = Duration::from_millis(500);

/// Timing contract of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeTimings {
    /// Upper bound for `open`, `list_areas`, `start_streaming`, and
    /// `stop_streaming` device I/O.
    pub io_timeout: Duration,
    /// Minimum time between a stream stopping and the next open/start.
    pub quiesce: Duration,
}

impl Default for BridgeTimings {
    fn default() -> Self {
        Self {
            io_timeout: DEFAULT_IO_TIMEOUT,
            quiesce: DEFAULT_QUIESCE,
        }
    }
}

/// What happened to a frame handed to [`BridgeConnectionManager::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDelivery {
    /// The frame was written to the streaming connection.
    Sent,
    /// No stream is bound; the frame was dropped.
    NoStream,
    /// A handshake held the connection; the frame was dropped.
    HandshakeInFlight,
    /// The connection rejected the frame; it was dropped.
    Failed,
}

#[derive(Default)]
struct Link {
    connection: Option<Box<dyn BridgeConnection>>,
    bound_area: Option<String>,
    quiesce_until: Option<Instant>,
}

/// The bridge connection manager.
pub struct BridgeConnectionManager {
    client: Arc<dyn BridgeClient>,
    clock: Arc<dyn Clock>,
    timings: BridgeTimings,
    link: Mutex<Link>,
}

impl BridgeConnectionManager {
    pub fn new(client: Arc<dyn BridgeClient>, clock: Arc<dyn Clock>, timings: BridgeTimings) -> Self {
        Self {
            client,
            clock,
            timings,
            link: Mutex::new(Link::default()),
        }
    }

    pub fn timings(&self) -> BridgeTimings {
        self.timings
    }

    /// Opens the device session, or keeps the one already open.
    ///
    /// # Errors
    ///
    /// - [`ControlError::Busy`] during the quiesce interval.
    /// - [`ControlError::Connection`] on network/auth failure or timeout.
    pub async fn open(
        &self,
        identity: &BridgeIdentity,
        credentials: &Credentials,
    ) -> Result<(), ControlError> {
        let mut link = self.link.lock().await;
        self.open_locked(&mut link, identity, credentials).await
    }

    /// Lists the bridge's entertainment areas over a short-lived connection.
    ///
    /// The held connection and the quiesce interval are left alone.
    ///
    /// # Errors
    ///
    /// [`ControlError::Connection`] on network/auth failure or timeout.
    pub async fn list_areas(
        &self,
        identity: &BridgeIdentity,
        credentials: &Credentials,
    ) -> Result<Vec<EntertainmentArea>, ControlError> {
        let timeout = self.timings.io_timeout;
        let mut connection = timed(timeout, "open", self.client.open(identity, credentials)).await?;
        let areas = timed(timeout, "list areas", connection.list_areas()).await;
        if tokio::time::timeout(timeout, connection.close()).await.is_err() {
            warn!("listing connection close timed out; dropping it");
        }
        areas
    }

    /// Starts the streaming handshake for `area_id` on the open connection.
    ///
    /// # Errors
    ///
    /// - [`ControlError::AlreadyStreaming`] if an area is already bound.
    /// - [`ControlError::Busy`] during the quiesce interval.
    /// - [`ControlError::AreaNotFound`] if the bridge does not know the area.
    /// - [`ControlError::Connection`] if no connection is open, or on I/O
    ///   failure or timeout.
    pub async fn start_streaming(&self, area_id: &str) -> Result<EntertainmentArea, ControlError> {
        let mut link = self.link.lock().await;
        if let Some(bound) = &link.bound_area {
            return Err(ControlError::AlreadyStreaming(bound.clone()));
        }
        self.check_quiesce(&link)?;

        let timeout = self.timings.io_timeout;
        let connection = link
            .connection
            .as_mut()
            .ok_or_else(|| ControlError::Connection("no open bridge connection".to_string()))?;
        let area = timed(timeout, "get area", connection.get_area(area_id)).await?;
        timed(timeout, "start stream", connection.start(&area)).await?;

        info!("streaming entertainment area {} ({})", area.id, area.name);
        link.bound_area = Some(area.id.clone());
        Ok(area)
    }

    /// Pushes one frame to the bound stream without waiting.
    ///
    /// Never fails: frames that cannot be delivered are dropped and logged.
    pub fn transition(&self, colors: &[ColorTriple]) -> FrameDelivery {
        let Ok(mut link) = self.link.try_lock() else {
            trace!("handshake in flight; frame dropped");
            return FrameDelivery::HandshakeInFlight;
        };
        if link.bound_area.is_none() {
            debug!("no bound stream; frame dropped");
            return FrameDelivery::NoStream;
        }
        let Some(connection) = link.connection.as_mut() else {
            debug!("no open connection; frame dropped");
            return FrameDelivery::NoStream;
        };

        match connection.transition(colors) {
            Ok(()) => FrameDelivery::Sent,
            Err(e) => {
                debug!("frame rejected by bridge: {e}");
                FrameDelivery::Failed
            }
        }
    }

    /// Ends the stream, closes the connection, and starts the quiesce interval.
    ///
    /// The connection is released and the quiesce interval starts even when
    /// the stop handshake fails.
    ///
    /// # Errors
    ///
    /// - [`ControlError::NoActiveSession`] if no area is bound.
    /// - [`ControlError::Connection`] if the stop handshake fails or times out.
    pub async fn stop_streaming(&self) -> Result<(), ControlError> {
        let mut link = self.link.lock().await;
        let Some(area) = link.bound_area.take() else {
            return Err(ControlError::NoActiveSession);
        };

        let result = match link.connection.as_mut() {
            Some(connection) => timed(self.timings.io_timeout, "stop stream", connection.stop()).await,
            None => Ok(()),
        };
        self.release_locked(&mut link).await;
        link.quiesce_until = Some(self.clock.now() + self.timings.quiesce);

        match &result {
            Ok(()) => info!("stopped streaming entertainment area {area}"),
            Err(e) => warn!("stop handshake for entertainment area {area} failed: {e}"),
        }
        result
    }

    /// Releases the connection, stopping any bound stream first.
    ///
    /// Safe to call any number of times.
    pub async fn close(&self) {
        let mut link = self.link.lock().await;
        if let Some(area) = link.bound_area.take() {
            if let Some(connection) = link.connection.as_mut() {
                if let Err(e) = timed(self.timings.io_timeout, "stop stream", connection.stop()).await {
                    warn!("stop handshake for entertainment area {area} failed during close: {e}");
                }
            }
            link.quiesce_until = Some(self.clock.now() + self.timings.quiesce);
        }
        self.release_locked(&mut link).await;
    }

    /// Returns the bound area id, if a stream is active.
    pub async fn bound_area(&self) -> Option<String> {
        self.link.lock().await.bound_area.clone()
    }

    /// Returns `true` while a connection object is held.
    pub async fn is_open(&self) -> bool {
        self.link.lock().await.connection.is_some()
    }

    /// Returns how long the quiesce interval still runs, if at all.
    pub async fn quiesce_remaining(&self) -> Option<Duration> {
        let link = self.link.lock().await;
        self.remaining(&link)
    }

    async fn open_locked(
        &self,
        link: &mut Link,
        identity: &BridgeIdentity,
        credentials: &Credentials,
    ) -> Result<(), ControlError> {
        if link.connection.is_some() {
            return Ok(());
        }
        self.check_quiesce(link)?;

        let connection = timed(
            self.timings.io_timeout,
            "open",
            self.client.open(identity, credentials),
        )
        .await?;
        info!("bridge connection opened to {} ({})", identity.id, identity.network_address);
        link.connection = Some(connection);
        Ok(())
    }

    async fn release_locked(&self, link: &mut Link) {
        if let Some(mut connection) = link.connection.take() {
            if tokio::time::timeout(self.timings.io_timeout, connection.close())
                .await
                .is_err()
            {
                warn!("bridge connection close timed out; dropping it");
            }
            debug!("bridge connection released");
        }
    }

    fn check_quiesce(&self, link: &Link) -> Result<(), ControlError> {
        match self.remaining(link) {
            Some(retry_after) => Err(ControlError::Busy { retry_after }),
            None => Ok(()),
        }
    }

    fn remaining(&self, link: &Link) -> Option<Duration> {
        let until = link.quiesce_until?;
        let now = self.clock.now();
        (now < until).then(|| until - now)
    }
}

/// Runs one device operation under `limit`, mapping failures to the
/// control taxonomy.
pub(crate) async fn timed<T, F>(limit: Duration, op: &str, fut: F) -> Result<T, ControlError>
where
    F: Future<Output = Result<T, BridgeClientError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(ControlError::from),
        Err(_) => Err(ControlError::Connection(format!(
            "{op} timed out after {} ms",
            limit.as_millis()
        ))),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
