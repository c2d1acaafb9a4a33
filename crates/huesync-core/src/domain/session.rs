//! Session: the streaming session state machine.
//!
//! A [`Session`] tracks which bridge the server talks to, the credentials the
//! bridge issued, and whether colour frames are currently being streamed.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//!                 register / quick-start
//!   NotReady ─────────────────────────────►  Ready
//!                                              │ begin_stream(area)
//!                                              ▼
//!                    end_stream()           Working
//!            Idle  ◄───────────────────────────┘
//!              │  begin_stream(area)           ▲
//!              └───────────────────────────────┘
//!
//!   any state ── fail(reason) ──► Error ── register / quick-start ──► Ready
//! ```
//!
//! - `NotReady`: no bridge identity or credentials are known yet.
//! - `Ready`: bridge identity and credentials are known; nothing streams.
//! - `Working`: an entertainment area is streaming.
//! - `Idle`: a stream ran and was stopped; a new one may begin.
//! - `Error`: the last device operation failed; the session must be
//!   re-registered or quick-started before it can stream again.
//!
//! # Invariants
//!
//! 1. `active_area_id` is `Some` if and only if `status == Working`.
//! 2. `status` is `Ready` or `Working` only when both `bridge_identity` and
//!    `credentials` are present.
//!
//! Fields are private; every mutation goes through a transition method that
//! validates before touching any field, so a rejected transition leaves the
//! session exactly as it was.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for rejected session transitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// No bridge identity or credentials are known.
    #[error("not initialized: no bridge identity or credentials")]
    NotInitialized,
    /// The requested transition is not legal from the current status.
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: SessionStatus,
        action: Transition,
    },
    /// `end_stream` was requested while nothing was streaming.
    #[error("no active stream")]
    NoActiveSession,
    /// The supplied credentials or bridge identity are empty.
    #[error("credentials and bridge identity must be non-empty")]
    InvalidCredentials,
}

/// Current status of the streaming session.
///
/// Serialized with the same lowercase labels the control surface reports
/// (`"not ready"`, `"ready"`, `"idle"`, `"working"`, `"error"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    #[serde(rename = "not ready")]
    NotReady,
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "working")]
    Working,
    #[serde(rename = "error")]
    Error,
}

impl SessionStatus {
    /// Returns the control-surface label for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::NotReady => "not ready",
            SessionStatus::Ready => "ready",
            SessionStatus::Idle => "idle",
            SessionStatus::Working => "working",
            SessionStatus::Error => "error",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names a transition request, used in [`SessionError::InvalidTransition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    RegisterCredentials,
    AttachBridge,
    BeginStream,
    EndStream,
    Fail,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Transition::RegisterCredentials => "register credentials",
            Transition::AttachBridge => "attach bridge",
            Transition::BeginStream => "begin stream",
            Transition::EndStream => "end stream",
            Transition::Fail => "fail",
        };
        f.write_str(label)
    }
}

/// Identity of a bridge on the local network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeIdentity {
    /// Bridge id as reported by discovery.
    pub id: String,
    /// IP address or host name the bridge answers on.
    #[serde(rename = "address", default)]
    pub network_address: String,
}

impl BridgeIdentity {
    pub fn new(id: impl Into<String>, network_address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            network_address: network_address.into(),
        }
    }

    /// Builds an identity for a bridge known only by its address.
    pub fn from_address(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            id: address.clone(),
            network_address: address,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.id.trim().is_empty()
    }
}

/// Secret pair issued by the bridge during registration.
///
/// Field names on the wire match the bridge's own JSON (`clientkey`,
/// `username`) so persisted files stay interchangeable with other tools.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(rename = "clientkey")]
    pub client_key: String,
    pub username: String,
}

impl Credentials {
    pub fn new(client_key: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            client_key: client_key.into(),
            username: username.into(),
        }
    }

    /// Returns `true` when both halves of the pair are non-empty.
    pub fn is_complete(&self) -> bool {
        !self.client_key.trim().is_empty() && !self.username.trim().is_empty()
    }
}

// The client key is a long-lived secret; keep it out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_key", &"<redacted>")
            .field("username", &self.username)
            .finish()
    }
}

/// The single live control object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    status: SessionStatus,
    bridge_identity: Option<BridgeIdentity>,
    credentials: Option<Credentials>,
    active_area_id: Option<String>,
    last_error: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Creates a session in `NotReady` with nothing known.
    pub fn new() -> Self {
        Self {
            status: SessionStatus::NotReady,
            bridge_identity: None,
            credentials: None,
            active_area_id: None,
            last_error: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn bridge_identity(&self) -> Option<&BridgeIdentity> {
        self.bridge_identity.as_ref()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn active_area_id(&self) -> Option<&str> {
        self.active_area_id.as_deref()
    }

    /// The reason recorded by the most recent [`Session::fail`], if the
    /// session has not been remediated since.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns `true` while frames should reach the bridge.
    pub fn is_streaming(&self) -> bool {
        self.status == SessionStatus::Working
    }

    /// Returns `true` when both bridge identity and credentials are known.
    pub fn is_initialized(&self) -> bool {
        self.bridge_identity.is_some() && self.credentials.is_some()
    }

    /// Checks both session invariants.  Used by tests and debug assertions.
    pub fn invariants_hold(&self) -> bool {
        let area_matches_status = self.active_area_id.is_some() == self.is_streaming();
        let attached_when_required = match self.status {
            SessionStatus::Ready | SessionStatus::Working => self.is_initialized(),
            _ => true,
        };
        area_matches_status && attached_when_required
    }

    /// Stores credentials issued by a bridge registration.
    ///
    /// Legal from every status except `Working`.  When `bridge` is supplied it
    /// becomes the session's bridge identity.  The session becomes `Ready` if
    /// a bridge identity is known afterwards and stays `NotReady` otherwise.
    /// Any recorded error is cleared.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidCredentials`] if either credential is empty.
    /// - [`SessionError::InvalidTransition`] while `Working`.
    pub fn register_credentials(
        &mut self,
        credentials: Credentials,
        bridge: Option<BridgeIdentity>,
    ) -> Result<SessionStatus, SessionError> {
        if !credentials.is_complete() || bridge.as_ref().is_some_and(|b| !b.is_complete()) {
            return Err(SessionError::InvalidCredentials);
        }
        if self.status == SessionStatus::Working {
            return Err(self.invalid(Transition::RegisterCredentials));
        }

        self.credentials = Some(credentials);
        if let Some(bridge) = bridge {
            self.bridge_identity = Some(bridge);
        }
        self.status = if self.bridge_identity.is_some() {
            SessionStatus::Ready
        } else {
            SessionStatus::NotReady
        };
        self.last_error = None;
        Ok(self.status)
    }

    /// Quick-start: atomically sets identity and credentials and moves to
    /// `Ready` from any status.
    ///
    /// An active area is released; callers that were streaming must stop the
    /// device-side stream themselves.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidCredentials`] if the identity id or
    /// either credential is empty.
    pub fn attach_bridge(
        &mut self,
        identity: BridgeIdentity,
        credentials: Credentials,
    ) -> Result<SessionStatus, SessionError> {
        if !identity.is_complete() || !credentials.is_complete() {
            return Err(SessionError::InvalidCredentials);
        }

        self.bridge_identity = Some(identity);
        self.credentials = Some(credentials);
        self.active_area_id = None;
        self.last_error = None;
        self.status = SessionStatus::Ready;
        Ok(self.status)
    }

    /// Validates that [`Session::begin_stream`] would succeed, without
    /// mutating anything.
    ///
    /// The controller calls this before doing device I/O so that an
    /// uninitialised session never touches the bridge.
    ///
    /// # Errors
    ///
    /// See [`Session::begin_stream`].
    pub fn check_begin_stream(&self) -> Result<(), SessionError> {
        if !self.is_initialized() {
            return Err(SessionError::NotInitialized);
        }
        match self.status {
            SessionStatus::Ready | SessionStatus::Idle => Ok(()),
            _ => Err(self.invalid(Transition::BeginStream)),
        }
    }

    /// `Ready | Idle → Working`, binding `area_id` as the active area.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotInitialized`] if identity or credentials are absent.
    /// - [`SessionError::InvalidTransition`] from any other status, or for an
    ///   empty area id.
    pub fn begin_stream(&mut self, area_id: impl Into<String>) -> Result<SessionStatus, SessionError> {
        self.check_begin_stream()?;
        let area_id = area_id.into();
        if area_id.trim().is_empty() {
            return Err(self.invalid(Transition::BeginStream));
        }

        self.active_area_id = Some(area_id);
        self.status = SessionStatus::Working;
        Ok(self.status)
    }

    /// `Working → Idle`, clearing the active area.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoActiveSession`] unless `Working`.
    pub fn end_stream(&mut self) -> Result<SessionStatus, SessionError> {
        if self.status != SessionStatus::Working {
            return Err(SessionError::NoActiveSession);
        }

        self.active_area_id = None;
        self.status = SessionStatus::Idle;
        Ok(self.status)
    }

    /// Any status `→ Error`.
    ///
    /// Identity and credentials are retained for diagnostics; the active area
    /// is released.
    pub fn fail(&mut self, reason: impl Into<String>) -> SessionStatus {
        self.active_area_id = None;
        self.last_error = Some(reason.into());
        self.status = SessionStatus::Error;
        self.status
    }

    fn invalid(&self, action: Transition) -> SessionError {
        SessionError::InvalidTransition {
            from: self.status,
            action,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("k", "u")
    }

    fn bridge() -> BridgeIdentity {
        BridgeIdentity::new("b1", "192.168.1.20")
    }

    fn ready_session() -> Session {
        let mut s = Session::new();
        s.attach_bridge(bridge(), creds()).unwrap();
        s
    }

    #[test]
    fn test_new_session_is_not_ready_and_empty() {
        let s = Session::new();
        assert_eq!(s.status(), SessionStatus::NotReady);
        assert!(s.bridge_identity().is_none());
        assert!(s.credentials().is_none());
        assert!(s.active_area_id().is_none());
        assert!(s.invariants_hold());
    }

    #[test]
    fn test_quick_start_scenario_ready_working_idle() {
        // Arrange
        let mut s = Session::new();

        // Act / Assert
        assert_eq!(
            s.attach_bridge(BridgeIdentity::new("b1", ""), creds()),
            Ok(SessionStatus::Ready)
        );
        assert_eq!(s.begin_stream("areaA"), Ok(SessionStatus::Working));
        assert_eq!(s.active_area_id(), Some("areaA"));
        assert_eq!(s.end_stream(), Ok(SessionStatus::Idle));
        assert_eq!(s.active_area_id(), None);
    }

    #[test]
    fn test_begin_stream_from_not_ready_fails_not_initialized() {
        let mut s = Session::new();
        let before = s.clone();

        let result = s.begin_stream("areaA");

        assert_eq!(result, Err(SessionError::NotInitialized));
        assert_eq!(s, before, "a rejected transition must not mutate the session");
    }

    #[test]
    fn test_begin_stream_while_working_is_invalid_transition() {
        let mut s = ready_session();
        s.begin_stream("areaA").unwrap();

        let result = s.begin_stream("areaB");

        assert_eq!(
            result,
            Err(SessionError::InvalidTransition {
                from: SessionStatus::Working,
                action: Transition::BeginStream,
            })
        );
        assert_eq!(s.active_area_id(), Some("areaA"));
    }

    #[test]
    fn test_begin_stream_from_error_requires_remediation() {
        let mut s = ready_session();
        s.fail("socket closed");

        assert!(matches!(
            s.begin_stream("areaA"),
            Err(SessionError::InvalidTransition { from: SessionStatus::Error, .. })
        ));

        s.attach_bridge(bridge(), creds()).unwrap();
        assert_eq!(s.begin_stream("areaA"), Ok(SessionStatus::Working));
    }

    #[test]
    fn test_begin_stream_rejects_empty_area() {
        let mut s = ready_session();
        assert!(matches!(
            s.begin_stream("  "),
            Err(SessionError::InvalidTransition { .. })
        ));
        assert_eq!(s.status(), SessionStatus::Ready);
    }

    #[test]
    fn test_end_stream_twice_second_fails_and_state_is_unchanged() {
        let mut s = ready_session();
        s.begin_stream("areaA").unwrap();
        s.end_stream().unwrap();
        let after_first = s.clone();

        let second = s.end_stream();

        assert_eq!(second, Err(SessionError::NoActiveSession));
        assert_eq!(s, after_first);
    }

    #[test]
    fn test_register_credentials_without_bridge_stays_not_ready() {
        let mut s = Session::new();
        assert_eq!(s.register_credentials(creds(), None), Ok(SessionStatus::NotReady));
        assert!(s.credentials().is_some());
        assert!(s.invariants_hold());
    }

    #[test]
    fn test_register_credentials_with_bridge_becomes_ready() {
        let mut s = Session::new();
        assert_eq!(
            s.register_credentials(creds(), Some(bridge())),
            Ok(SessionStatus::Ready)
        );
        assert_eq!(s.bridge_identity(), Some(&bridge()));
    }

    #[test]
    fn test_register_credentials_clears_error() {
        let mut s = ready_session();
        s.fail("timeout");
        assert_eq!(s.last_error(), Some("timeout"));

        s.register_credentials(Credentials::new("k2", "u2"), None).unwrap();

        assert_eq!(s.status(), SessionStatus::Ready);
        assert_eq!(s.last_error(), None);
    }

    #[test]
    fn test_register_credentials_rejected_while_working() {
        let mut s = ready_session();
        s.begin_stream("areaA").unwrap();
        assert!(matches!(
            s.register_credentials(creds(), None),
            Err(SessionError::InvalidTransition { action: Transition::RegisterCredentials, .. })
        ));
    }

    #[test]
    fn test_register_credentials_rejects_empty_pair() {
        let mut s = Session::new();
        assert_eq!(
            s.register_credentials(Credentials::new("", "u"), None),
            Err(SessionError::InvalidCredentials)
        );
        assert_eq!(s.status(), SessionStatus::NotReady);
    }

    #[test]
    fn test_attach_bridge_while_working_releases_area() {
        let mut s = ready_session();
        s.begin_stream("areaA").unwrap();

        s.attach_bridge(BridgeIdentity::new("b2", "10.0.0.2"), creds()).unwrap();

        assert_eq!(s.status(), SessionStatus::Ready);
        assert_eq!(s.active_area_id(), None);
        assert!(s.invariants_hold());
    }

    #[test]
    fn test_attach_bridge_rejects_empty_identity() {
        let mut s = Session::new();
        assert_eq!(
            s.attach_bridge(BridgeIdentity::new("", "10.0.0.2"), creds()),
            Err(SessionError::InvalidCredentials)
        );
    }

    #[test]
    fn test_fail_retains_identity_and_clears_area() {
        let mut s = ready_session();
        s.begin_stream("areaA").unwrap();

        s.fail("stop handshake failed");

        assert_eq!(s.status(), SessionStatus::Error);
        assert_eq!(s.active_area_id(), None);
        assert!(s.bridge_identity().is_some());
        assert!(s.credentials().is_some());
    }

    #[test]
    fn test_credentials_debug_redacts_client_key() {
        let text = format!("{:?}", Credentials::new("super-secret", "user"));
        assert!(!text.contains("super-secret"));
        assert!(text.contains("user"));
    }

    #[test]
    fn test_status_labels_match_control_surface() {
        assert_eq!(SessionStatus::NotReady.to_string(), "not ready");
        assert_eq!(SessionStatus::Working.as_str(), "working");
    }

    #[test]
    fn test_invalid_transition_message_names_action_and_status() {
        let err = SessionError::InvalidTransition {
            from: SessionStatus::Error,
            action: Transition::BeginStream,
        };
        assert_eq!(err.to_string(), "cannot begin stream while error");
    }
}
