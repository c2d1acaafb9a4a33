//! SessionController: the session API exposed to the control surface.
//!
//! Every operation returns `Result<T, ControlError>`; the control surface
//! wraps it in a [`CommandResult`](super::response::CommandResult).
//!
//! # Ordering
//!
//! Mutating operations take the `ops` mutex for their whole duration, device
//! I/O included.  Tokio's mutex is fair, so requests are applied in arrival
//! order and two handshakes never interleave.  `get_status` only reads the
//! session store and never waits behind a handshake in progress.
//!
//! # Failure escalation
//!
//! Device I/O failures during `begin_stream` / `end_stream` move the session
//! to `error` (see [`ControlError::requires_remediation`]).  Rejections that
//! leave the device untouched (`AREA_NOT_FOUND`, `ALREADY_STREAMING`, `BUSY`)
//! do not change the session.

use std::sync::Arc;

use huesync_core::{BridgeIdentity, ControlError, Credentials, SessionStatus, Transition};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::bridge_client::BridgeClient;
use super::bridge_manager::{timed, BridgeConnectionManager};
use super::persistence::{CredentialStore, StoredBridge};
use super::session_store::SessionStore;

/// Reply to `get_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: SessionStatus,
    #[serde(rename = "activeAreaId", default, skip_serializing_if = "Option::is_none")]
    pub active_area_id: Option<String>,
    #[serde(rename = "lastError", default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// One entry of `list_areas`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaSummary {
    pub id: String,
    pub name: String,
}

/// The session controller.
pub struct SessionController {
    session: Arc<SessionStore>,
    bridge: Arc<BridgeConnectionManager>,
    client: Arc<dyn BridgeClient>,
    store: Arc<dyn CredentialStore>,
    app_name: String,
    discovered: Mutex<Vec<BridgeIdentity>>,
    ops: Mutex<()>,
}

impl SessionController {
    pub fn new(
        session: Arc<SessionStore>,
        bridge: Arc<BridgeConnectionManager>,
        client: Arc<dyn BridgeClient>,
        store: Arc<dyn CredentialStore>,
        app_name: impl Into<String>,
    ) -> Self {
        Self {
            session,
            bridge,
            client,
            store,
            app_name: app_name.into(),
            discovered: Mutex::new(Vec::new()),
            ops: Mutex::new(()),
        }
    }

    pub async fn get_status(&self) -> StatusReport {
        let session = self.session.snapshot().await;
        StatusReport {
            status: session.status(),
            active_area_id: session.active_area_id().map(str::to_owned),
            last_error: session.last_error().map(str::to_owned),
        }
    }

    /// Finds bridges on the local network and caches the result for
    /// [`SessionController::register`].
    pub async fn discover_bridges(&self) -> Result<Vec<BridgeIdentity>, ControlError> {
        let found = timed(self.bridge.timings().io_timeout, "discover", self.client.discover()).await?;
        info!("discovered {} bridge(s)", found.len());
        *self.discovered.lock().await = found.clone();
        Ok(found)
    }

    /// Registers with the bridge at `address` and persists the credentials.
    ///
    /// `name` defaults to the configured application name.  The bridge id is
    /// taken from the last discovery result for `address`, or is the address
    /// itself if the bridge was never discovered.
    ///
    /// # Errors
    ///
    /// - [`ControlError::InvalidTransition`] while streaming.
    /// - [`ControlError::Connection`] if the bridge cannot be reached or its
    ///   link button was not pressed.
    pub async fn register(&self, address: &str, name: Option<&str>) -> Result<Credentials, ControlError> {
        let _op = self.ops.lock().await;
        if self.session.status().await == SessionStatus::Working {
            return Err(ControlError::InvalidTransition {
                from: SessionStatus::Working,
                action: Transition::RegisterCredentials,
            });
        }

        let app_name = name.unwrap_or(&self.app_name);
        let credentials = timed(
            self.bridge.timings().io_timeout,
            "register",
            self.client.register(address, app_name),
        )
        .await?;
        let identity = self.identity_for(address).await;
        // An open connection was made with the previous credentials.
        self.bridge.close().await;

        self.session
            .apply(|s| s.register_credentials(credentials.clone(), Some(identity.clone())))
            .await?;
        info!("registered as {app_name} with bridge {} at {address}", identity.id);

        self.persist(&credentials, &identity);
        Ok(credentials)
    }

    /// Attaches a known bridge and credentials, moving to `ready` from any
    /// status.
    ///
    /// A running stream is stopped and the old connection released first.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidCredentials`] for an empty bridge id or
    /// credential; nothing is changed in that case.
    pub async fn quick_start(
        &self,
        identity: BridgeIdentity,
        credentials: Credentials,
    ) -> Result<SessionStatus, ControlError> {
        let _op = self.ops.lock().await;
        if !identity.is_complete() || !credentials.is_complete() {
            return Err(ControlError::InvalidCredentials);
        }

        if self.session.apply(|s| s.end_stream()).await.is_ok() {
            info!("quick-start: stopping the running stream first");
        }
        // Any open connection belongs to the previous identity.
        self.bridge.close().await;

        let status = self
            .session
            .apply(|s| s.attach_bridge(identity.clone(), credentials.clone()))
            .await?;
        info!("quick-start: attached bridge {} at {}", identity.id, identity.network_address);

        self.persist(&credentials, &identity);
        Ok(status)
    }

    /// Lists the attached bridge's entertainment areas.
    ///
    /// # Errors
    ///
    /// - [`ControlError::NotInitialized`] if no bridge is attached.
    /// - [`ControlError::Connection`] on device I/O failure.
    pub async fn list_areas(&self) -> Result<Vec<AreaSummary>, ControlError> {
        let _op = self.ops.lock().await;
        let (identity, credentials) = self.attached().await?;

        let areas = self.bridge.list_areas(&identity, &credentials).await?;
        Ok(areas
            .into_iter()
            .map(|a| AreaSummary { id: a.id, name: a.name })
            .collect())
    }

    /// Starts streaming `area_id`.
    ///
    /// # Errors
    ///
    /// - [`ControlError::NotInitialized`] if no bridge is attached.
    /// - [`ControlError::InvalidTransition`] unless `ready` or `idle`.
    /// - [`ControlError::Busy`] during the quiesce interval.
    /// - [`ControlError::AreaNotFound`] / [`ControlError::AlreadyStreaming`]
    ///   if the bridge rejects the area.
    /// - [`ControlError::Connection`] on device I/O failure; the session
    ///   moves to `error`.
    pub async fn begin_stream(&self, area_id: &str) -> Result<SessionStatus, ControlError> {
        let _op = self.ops.lock().await;
        let snapshot = self.session.snapshot().await;
        snapshot.check_begin_stream()?;
        let (identity, credentials) = self.attached().await?;

        if let Err(e) = self.bridge.open(&identity, &credentials).await {
            return Err(self.escalate(e).await);
        }
        if let Err(e) = self.bridge.start_streaming(area_id).await {
            return Err(self.escalate(e).await);
        }

        match self.session.apply(|s| s.begin_stream(area_id)).await {
            Ok(status) => Ok(status),
            Err(e) => {
                // Keep the device consistent with the rejected transition.
                if let Err(stop_err) = self.bridge.stop_streaming().await {
                    warn!("stopping stream after rejected begin failed: {stop_err}");
                }
                Err(e.into())
            }
        }
    }

    /// Stops the active stream.
    ///
    /// The gate closes before the stop handshake starts, so no frame reaches
    /// the bridge once this is called.
    ///
    /// # Errors
    ///
    /// - [`ControlError::NoActiveSession`] unless `working`.
    /// - [`ControlError::Connection`] if the stop handshake fails; the session
    ///   moves to `error`.
    pub async fn end_stream(&self) -> Result<SessionStatus, ControlError> {
        let _op = self.ops.lock().await;
        let status = self.session.apply(|s| s.end_stream()).await?;

        match self.bridge.stop_streaming().await {
            Ok(()) => Ok(status),
            Err(ControlError::NoActiveSession) => {
                debug!("bridge had no bound stream at end_stream");
                Ok(status)
            }
            Err(e) => Err(self.escalate(e).await),
        }
    }

    /// Restores the persisted bridge record at startup.
    ///
    /// A complete record quick-starts the session; credentials without a
    /// bridge identity are registered and leave the session `not ready`.
    /// Unusable records are cleared.
    pub async fn restore(&self) -> SessionStatus {
        let Some(record) = self.store.load() else {
            debug!("no stored bridge credentials");
            return self.session.status().await;
        };

        if record.is_restorable() {
            if let Some(bridge) = record.bridge {
                match self.quick_start(bridge, record.credentials).await {
                    Ok(status) => {
                        info!("restored bridge session from stored credentials");
                        return status;
                    }
                    Err(e) => warn!("stored credentials rejected: {e}"),
                }
            }
        } else if record.credentials.is_complete() {
            let credentials = record.credentials;
            if let Ok(status) = self.session.apply(|s| s.register_credentials(credentials, None)).await {
                info!("restored credentials without a bridge identity");
                return status;
            }
        }

        if let Err(e) = self.store.clear() {
            warn!("clearing unusable credential record failed: {e}");
        }
        self.session.status().await
    }

    /// Ends any stream and releases the bridge connection.
    pub async fn shutdown(&self) {
        if self.session.status().await == SessionStatus::Working {
            if let Err(e) = self.end_stream().await {
                warn!("end stream during shutdown failed: {e}");
            }
        }
        self.bridge.close().await;
        info!("session controller shut down");
    }

    async fn attached(&self) -> Result<(BridgeIdentity, Credentials), ControlError> {
        let session = self.session.snapshot().await;
        match (session.bridge_identity(), session.credentials()) {
            (Some(identity), Some(credentials)) => Ok((identity.clone(), credentials.clone())),
            _ => Err(ControlError::NotInitialized),
        }
    }

    async fn identity_for(&self, address: &str) -> BridgeIdentity {
        self.discovered
            .lock()
            .await
            .iter()
            .find(|b| b.network_address == address)
            .cloned()
            .unwrap_or_else(|| BridgeIdentity::from_address(address))
    }

    fn persist(&self, credentials: &Credentials, identity: &BridgeIdentity) {
        let record = StoredBridge::new(credentials.clone(), Some(identity.clone()));
        if let Err(e) = self.store.save(&record) {
            warn!("failed to persist bridge credentials: {e}");
        }
    }

    async fn escalate(&self, e: ControlError) -> ControlError {
        if e.requires_remediation() {
            warn!("bridge operation failed, session moves to error: {e}");
            self.session.fail(e.to_string()).await;
        }
        e
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
