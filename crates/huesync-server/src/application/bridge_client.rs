//! Bridge client capability.
//!
//! The wire protocol used to talk to a Hue bridge (REST for discovery and
//! registration, DTLS for entertainment streaming) belongs to a bridge client
//! library.  This module describes what the server needs from such a library
//! as two async traits:
//!
//! - [`BridgeClient`] – stateless operations plus `open`, which yields a
//!   connection bound to one bridge and one credential pair.
//! - [`BridgeConnection`] – everything done over an open connection.
//!
//! Implementations live in the infrastructure layer.

use async_trait::async_trait;
use huesync_core::{BridgeIdentity, ColorTriple, ControlError, Credentials};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type reported by bridge client implementations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeClientError {
    /// The bridge could not be reached.
    #[error("bridge unreachable: {0}")]
    Unreachable(String),
    /// The bridge rejected the credentials.
    #[error("bridge rejected the credentials")]
    Unauthorized,
    /// Registration was attempted without pressing the bridge's link button.
    #[error("link button not pressed")]
    LinkButtonNotPressed,
    /// The bridge does not know the requested entertainment area.
    #[error("entertainment area not found: {0}")]
    AreaNotFound(String),
    /// The bridge already streams an entertainment area.
    #[error("entertainment area {0} is already streaming")]
    AlreadyStreaming(String),
    /// The streaming socket failed.
    #[error("stream socket error: {0}")]
    Stream(String),
}

impl From<BridgeClientError> for ControlError {
    fn from(e: BridgeClientError) -> Self {
        match e {
            BridgeClientError::AreaNotFound(id) => ControlError::AreaNotFound(id),
            BridgeClientError::AlreadyStreaming(id) => ControlError::AlreadyStreaming(id),
            other => ControlError::Connection(other.to_string()),
        }
    }
}

/// A device-side grouping of lights addressable as one streaming target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntertainmentArea {
    pub id: String,
    pub name: String,
    /// Number of light zones (one colour triple each).
    #[serde(default)]
    pub zone_count: usize,
}

/// Operations that do not need an open connection, plus `open`.
#[async_trait]
pub trait BridgeClient: Send + Sync {
    /// Finds bridges on the local network.
    async fn discover(&self) -> Result<Vec<BridgeIdentity>, BridgeClientError>;

    /// Registers `app_name` with the bridge at `address` and returns the
    /// issued credentials.  The bridge's link button must have been pressed.
    async fn register(
        &self,
        address: &str,
        app_name: &str,
    ) -> Result<Credentials, BridgeClientError>;

    /// Opens a device session.
    async fn open(
        &self,
        identity: &BridgeIdentity,
        credentials: &Credentials,
    ) -> Result<Box<dyn BridgeConnection>, BridgeClientError>;
}

/// An open device session.
#[async_trait]
pub trait BridgeConnection: Send + Sync {
    async fn list_areas(&self) -> Result<Vec<EntertainmentArea>, BridgeClientError>;

    /// Looks up one area; unknown ids yield [`BridgeClientError::AreaNotFound`].
    async fn get_area(&self, id: &str) -> Result<EntertainmentArea, BridgeClientError>;

    /// Starts the streaming handshake for `area`.
    async fn start(&mut self, area: &EntertainmentArea) -> Result<(), BridgeClientError>;

    /// Ends the streaming handshake.
    async fn stop(&mut self) -> Result<(), BridgeClientError>;

    /// Sends one frame of colours.  Must not block.
    fn transition(&mut self, colors: &[ColorTriple]) -> Result<(), BridgeClientError>;

    /// Releases the device session.
    async fn close(&mut self);
}
