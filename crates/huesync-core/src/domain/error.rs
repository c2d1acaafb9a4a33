//! Error taxonomy surfaced at the session-controller boundary.
//!
//! Every failure a control-surface caller can observe is a [`ControlError`].
//! Callers must be able to tell conditions apart without parsing messages, so
//! each variant maps to an [`ErrorCode`] whose serialized name is stable.
//!
//! | Code                  | Recovery                                          |
//! |-----------------------|---------------------------------------------------|
//! | `NOT_INITIALIZED`     | register or quick-start first                     |
//! | `INVALID_TRANSITION`  | re-check status, then retry                       |
//! | `NO_ACTIVE_SESSION`   | nothing to stop                                   |
//! | `AREA_NOT_FOUND`      | pick an area from `listAreas`                     |
//! | `ALREADY_STREAMING`   | stop the bound area first                         |
//! | `CONNECTION_ERROR`    | session is in `error`; re-register / quick-start  |
//! | `MALFORMED_FRAME`     | producer bug; frame dropped                       |
//! | `BUSY`                | retry after `retry_after`                         |
//! | `INVALID_CREDENTIALS` | supply a non-empty key, user, and bridge id       |

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::frame::FrameError;
use super::session::{SessionError, SessionStatus, Transition};

/// Stable, machine-readable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotInitialized,
    InvalidTransition,
    NoActiveSession,
    AreaNotFound,
    AlreadyStreaming,
    ConnectionError,
    MalformedFrame,
    Busy,
    InvalidCredentials,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotInitialized => "NOT_INITIALIZED",
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
            ErrorCode::NoActiveSession => "NO_ACTIVE_SESSION",
            ErrorCode::AreaNotFound => "AREA_NOT_FOUND",
            ErrorCode::AlreadyStreaming => "ALREADY_STREAMING",
            ErrorCode::ConnectionError => "CONNECTION_ERROR",
            ErrorCode::MalformedFrame => "MALFORMED_FRAME",
            ErrorCode::Busy => "BUSY",
            ErrorCode::InvalidCredentials => "INVALID_CREDENTIALS",
        }
    }
}

/// Every recoverable failure of a session-control operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlError {
    /// No bridge identity or credentials are known yet.
    #[error("Not Initialized!")]
    NotInitialized,

    /// The requested transition is not legal from the current status.
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: SessionStatus,
        action: Transition,
    },

    /// A stop was requested with nothing streaming.
    #[error("No Active Stream!")]
    NoActiveSession,

    /// The bridge does not know the requested entertainment area.
    #[error("entertainment area not found: {0}")]
    AreaNotFound(String),

    /// Another entertainment area is already bound to the stream.
    #[error("already streaming entertainment area {0}")]
    AlreadyStreaming(String),

    /// Device I/O failed or timed out.
    #[error("bridge connection error: {0}")]
    Connection(String),

    /// A producer frame could not be split into RGB triples.
    #[error("malformed frame of {len} channel values")]
    MalformedFrame { len: usize },

    /// A start was requested during the post-stop quiesce interval.
    #[error("bridge is settling after the last stream; retry in {} ms", retry_after.as_millis())]
    Busy { retry_after: Duration },

    /// Empty credentials or bridge identity were supplied.
    #[error("credentials and bridge identity must be non-empty")]
    InvalidCredentials,
}

impl ControlError {
    /// Returns the stable code callers should match on.
    pub fn code(&self) -> ErrorCode {
        match self {
            ControlError::NotInitialized => ErrorCode::NotInitialized,
            ControlError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            ControlError::NoActiveSession => ErrorCode::NoActiveSession,
            ControlError::AreaNotFound(_) => ErrorCode::AreaNotFound,
            ControlError::AlreadyStreaming(_) => ErrorCode::AlreadyStreaming,
            ControlError::Connection(_) => ErrorCode::ConnectionError,
            ControlError::MalformedFrame { .. } => ErrorCode::MalformedFrame,
            ControlError::Busy { .. } => ErrorCode::Busy,
            ControlError::InvalidCredentials => ErrorCode::InvalidCredentials,
        }
    }

    /// Returns `true` for failures that leave the session in `error` until a
    /// register or quick-start remediates it.
    pub fn requires_remediation(&self) -> bool {
        matches!(
            self,
            ControlError::Connection(_) | ControlError::MalformedFrame { .. }
        )
    }
}

impl From<SessionError> for ControlError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotInitialized => ControlError::NotInitialized,
            SessionError::InvalidTransition { from, action } => {
                ControlError::InvalidTransition { from, action }
            }
            SessionError::NoActiveSession => ControlError::NoActiveSession,
            SessionError::InvalidCredentials => ControlError::InvalidCredentials,
        }
    }
}

impl From<FrameError> for ControlError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Malformed { len } => ControlError::MalformedFrame { len },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
