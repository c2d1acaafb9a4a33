//! JSON file credential store.
//!
//! The file holds one [`StoredBridge`] record:
//!
//! ```json
//! { "clientkey": "...", "username": "...", "bridge": { "id": "...", "address": "..." } }
//! ```

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::application::persistence::{CredentialStore, StorageError, StoredBridge};

/// Stores the bridge record in a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonCredentialStore {
    path: PathBuf,
}

impl JsonCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CredentialStore for JsonCredentialStore {
    /// A missing, unreadable, or malformed file loads as `None`.
    fn load(&self) -> Option<StoredBridge> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no credential file at {}", self.path.display());
                return None;
            }
            Err(e) => {
                warn!("cannot read credential file {}: {e}", self.path.display());
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("ignoring malformed credential file {}: {e}", self.path.display());
                None
            }
        }
    }

    fn save(&self, record: &StoredBridge) -> Result<(), StorageError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }
        let json =
            serde_json::to_string_pretty(record).map_err(|e| StorageError::Format(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| self.io_error(e))?;
        debug!("credentials saved to {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
