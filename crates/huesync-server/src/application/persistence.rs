//! Credential store capability.
//!
//! Credentials and the last-known bridge identity are persisted so that the
//! session survives a process restart.  The storage medium is an
//! infrastructure concern; the controller only sees [`CredentialStore`].

use std::path::PathBuf;

use huesync_core::{BridgeIdentity, Credentials};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One persisted record.
///
/// Serialized flat: `{"clientkey": .., "username": .., "bridge": {..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBridge {
    #[serde(flatten)]
    pub credentials: Credentials,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<BridgeIdentity>,
}

impl StoredBridge {
    pub fn new(credentials: Credentials, bridge: Option<BridgeIdentity>) -> Self {
        Self { credentials, bridge }
    }

    /// Returns `true` when the record is enough to quick-start a session.
    pub fn is_restorable(&self) -> bool {
        self.credentials.is_complete()
            && self
                .bridge
                .as_ref()
                .is_some_and(|b| !b.id.is_empty())
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("credential file I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("credential file format error: {0}")]
    Format(String),
}

/// Durable storage for the bridge record.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialStore: Send + Sync {
    /// Returns the stored record, or `None` if nothing usable is stored.
    fn load(&self) -> Option<StoredBridge>;

    fn save(&self, record: &StoredBridge) -> Result<(), StorageError>;

    /// Removes the stored record.  Removing an absent record succeeds.
    fn clear(&self) -> Result<(), StorageError>;
}
