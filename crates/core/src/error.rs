//! Error types for the session controller

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::SessionState;

/// Reason a session ended in `Failed`
///
/// Every kind is terminal for the session it occurred in. The controller
/// never retries; the host decides whether to issue a fresh start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Camera permission was refused
    #[error("camera permission denied")]
    PermissionDenied,

    /// The capture device could not be found, opened or accessed
    #[error("capture device unavailable")]
    DeviceUnavailable,

    /// The capture device went away with an error code
    #[error("capture device disconnected")]
    DeviceDisconnected,

    /// The publish transport could not connect to the target
    #[error("publish connect failed")]
    PublishConnectFailed,

    /// Capture session or encoder configuration was rejected
    #[error("capture configuration failed")]
    ConfigurationFailed,

    /// Device open or transport connect missed its deadline
    #[error("operation timed out")]
    Timeout,
}

/// Errors returned by controller operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session failed while the call was in progress
    #[error("Session failed: {0}")]
    Failed(#[from] ErrorKind),

    /// A session is already running
    #[error("Session already active (state: {0})")]
    AlreadyActive(SessionState),

    /// The publish target was rejected before anything was touched
    #[error("Invalid publish target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },
}

impl SessionError {
    /// Get the session failure kind, if this error carries one
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            SessionError::Failed(kind) => Some(*kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::PermissionDenied.to_string(), "camera permission denied");
        assert_eq!(ErrorKind::Timeout.to_string(), "operation timed out");
    }

    #[test]
    fn test_session_error_kind() {
        let err: SessionError = ErrorKind::DeviceUnavailable.into();
        assert_eq!(err.kind(), Some(ErrorKind::DeviceUnavailable));
        assert_eq!(err.to_string(), "Session failed: capture device unavailable");

        let err = SessionError::AlreadyActive(SessionState::Publishing);
        assert_eq!(err.kind(), None);
        assert_eq!(err.to_string(), "Session already active (state: publishing)");
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::PublishConnectFailed).unwrap();
        assert_eq!(json, "\"publish_connect_failed\"");
    }
}
