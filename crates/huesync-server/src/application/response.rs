//! Uniform response wrapper for control-surface commands.
//!
//! ```json
//! { "success": true,  "data": {...}, "error": null }
//! { "success": false, "data": null,  "error": { "code": "NO_ACTIVE_SESSION", "message": "No Active Stream!" } }
//! ```

use huesync_core::{ControlError, ErrorCode};
use serde::{Deserialize, Serialize};

/// Machine-readable failure payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&ControlError> for ErrorPayload {
    fn from(e: &ControlError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

/// Unified response wrapper.
///
/// Callers check `success` before using `data`, and match on
/// `error.code` rather than on the message text.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T: Serialize> {
    pub success: bool,
    /// Present only when `success` is `true`.
    pub data: Option<T>,
    /// Present only when `success` is `false`.
    pub error: Option<ErrorPayload>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(e: &ControlError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorPayload::from(e)),
        }
    }
}

impl<T: Serialize> From<Result<T, ControlError>> for CommandResult<T> {
    fn from(result: Result<T, ControlError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(&e),
        }
    }
}
