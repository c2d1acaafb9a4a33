//! Announce supervisor: keeps the service discoverable.
//!
//! The supervisor advertises the service metadata on the local network and,
//! when a [`TunnelOpener`] is configured, first opens a tunnel and adds its
//! public URL to the metadata.  It runs independently of the session: its
//! failures are logged and retried, never surfaced as session status.
//!
//! # Lifecycle
//!
//! ```text
//!   attempt n:  open tunnel? ──► advertise ──► up (wait for shutdown)
//!                    │              │                   │
//!                    └── failure ◄──┘ (tunnel closed)   ▼
//!                          │                  close tunnel → end advertise
//!                          ▼                  → destroy advertiser
//!                 report, sleep delay_for(n),
//!                 retry from scratch
//! ```
//!
//! Retries are unbounded.  The delay between attempts grows exponentially
//! from [`RetryPolicy::initial_delay`] up to [`RetryPolicy::max_delay`] and is
//! never zero, so a network that stays down does not produce a tight loop.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lower bound for the delay between attempts.
pub const MIN_RETRY_DELAY: Duration = Duration::from_millis(100);

/// TXT-style metadata key carrying the tunnel's public URL.
pub const TXT_URL: &str = "url";

/// What the service announces about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub txt: BTreeMap<String, String>,
}

impl ServiceMetadata {
    pub fn new(name: impl Into<String>, service_type: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            service_type: service_type.into(),
            port,
            txt: BTreeMap::new(),
        }
    }

    /// Returns a copy carrying `url` as auxiliary metadata.
    pub fn with_url(&self, url: &str) -> Self {
        let mut metadata = self.clone();
        metadata.txt.insert(TXT_URL.to_string(), url.to_string());
        metadata
    }
}

/// Opaque handle for one live advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdvertiseHandle(pub Uuid);

impl AdvertiseHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AdvertiseHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("tunnel error: {0}")]
    Tunnel(String),
    #[error("advertise error: {0}")]
    Advertise(String),
}

/// Local-network service advertisement.
#[async_trait]
pub trait Advertiser: Send + Sync {
    async fn advertise(&self, metadata: &ServiceMetadata) -> Result<AdvertiseHandle, TransportError>;

    async fn end_advertise(&self, handle: AdvertiseHandle) -> Result<(), TransportError>;

    /// Releases everything the advertiser holds.  Called once on shutdown.
    async fn destroy(&self) {}
}

/// Opens a tunnel exposing a local port.
#[async_trait]
pub trait TunnelOpener: Send + Sync {
    async fn open_tunnel(&self, port: u16) -> Result<Box<dyn Tunnel>, TransportError>;
}

/// An established tunnel.
#[async_trait]
pub trait Tunnel: Send + Sync {
    /// Externally reachable URL.
    fn url(&self) -> &str;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Spacing between failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th consecutive failure (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self
            .initial_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        delay.max(MIN_RETRY_DELAY)
    }
}

/// Called with the attempt number and error after every failed attempt.
pub type FailureHandler = Arc<dyn Fn(u32, &TransportError) + Send + Sync>;

struct Established {
    tunnel: Option<Box<dyn Tunnel>>,
    handle: AdvertiseHandle,
}

/// Keeps the advertisement (and optional tunnel) alive until shutdown.
pub struct AnnounceSupervisor {
    advertiser: Arc<dyn Advertiser>,
    tunnel_opener: Option<Arc<dyn TunnelOpener>>,
    metadata: ServiceMetadata,
    retry: RetryPolicy,
    on_failure: Option<FailureHandler>,
}

impl AnnounceSupervisor {
    pub fn new(advertiser: Arc<dyn Advertiser>, metadata: ServiceMetadata, retry: RetryPolicy) -> Self {
        Self {
            advertiser,
            tunnel_opener: None,
            metadata,
            retry,
            on_failure: None,
        }
    }

    pub fn with_tunnel(mut self, opener: Arc<dyn TunnelOpener>) -> Self {
        self.tunnel_opener = Some(opener);
        self
    }

    pub fn with_failure_handler(mut self, handler: FailureHandler) -> Self {
        self.on_failure = Some(handler);
        self
    }

    /// Runs until `shutdown` becomes `true` (or its sender is dropped).
    ///
    /// Returns the number of setup attempts made.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> u32 {
        let mut attempt = 0u32;
        loop {
            if *shutdown.borrow_and_update() {
                self.advertiser.destroy().await;
                return attempt;
            }
            attempt = attempt.saturating_add(1);

            match self.establish().await {
                Ok(established) => {
                    info!(
                        "announcing {} ({}) on port {} after {attempt} attempt(s)",
                        self.metadata.name, self.metadata.service_type, self.metadata.port
                    );
                    wait_for_shutdown(&mut shutdown).await;
                    self.teardown(established).await;
                    return attempt;
                }
                Err(e) => {
                    let delay = self.retry.delay_for(attempt);
                    error!(
                        "announce attempt {attempt} failed: {e}; retrying in {} ms",
                        delay.as_millis()
                    );
                    if let Some(handler) = &self.on_failure {
                        handler(attempt, &e);
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = wait_for_shutdown(&mut shutdown) => {
                            self.advertiser.destroy().await;
                            return attempt;
                        }
                    }
                }
            }
        }
    }

    async fn establish(&self) -> Result<Established, TransportError> {
        let mut tunnel = match &self.tunnel_opener {
            Some(opener) => Some(opener.open_tunnel(self.metadata.port).await?),
            None => None,
        };

        let metadata = match &tunnel {
            Some(t) => {
                debug!("tunnel open at {}", t.url());
                self.metadata.with_url(t.url())
            }
            None => self.metadata.clone(),
        };

        match self.advertiser.advertise(&metadata).await {
            Ok(handle) => Ok(Established { tunnel, handle }),
            Err(e) => {
                if let Some(t) = tunnel.as_mut() {
                    if let Err(close_err) = t.close().await {
                        warn!("closing tunnel after failed advertise: {close_err}");
                    }
                }
                Err(e)
            }
        }
    }

    async fn teardown(&self, established: Established) {
        let Established { tunnel, handle } = established;
        if let Some(mut t) = tunnel {
            if let Err(e) = t.close().await {
                warn!("tunnel close failed: {e}");
            }
        }
        if let Err(e) = self.advertiser.end_advertise(handle).await {
            warn!("end advertise failed: {e}");
        }
        self.advertiser.destroy().await;
        info!("announce supervisor stopped");
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
