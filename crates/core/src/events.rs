//! Observer-facing views of the session
//!
//! Observers never touch the session itself. They read [`SessionSnapshot`]s
//! and receive [`SessionEvent`]s over a broadcast channel; the `Error`
//! events are the host's notification channel for [`ErrorKind`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::state::SessionState;

/// Event emitted by the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The session moved from one state to another
    StateChanged {
        generation: u64,
        from: SessionState,
        to: SessionState,
        at: DateTime<Utc>,
    },

    /// The session failed
    Error {
        generation: u64,
        kind: ErrorKind,
        at: DateTime<Utc>,
    },
}

impl SessionEvent {
    pub fn state_changed(generation: u64, from: SessionState, to: SessionState) -> Self {
        SessionEvent::StateChanged {
            generation,
            from,
            to,
            at: Utc::now(),
        }
    }

    pub fn error(generation: u64, kind: ErrorKind) -> Self {
        SessionEvent::Error {
            generation,
            kind,
            at: Utc::now(),
        }
    }

    /// Session generation the event belongs to
    pub fn generation(&self) -> u64 {
        match self {
            SessionEvent::StateChanged { generation, .. } => *generation,
            SessionEvent::Error { generation, .. } => *generation,
        }
    }
}

/// Point-in-time view of the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub generation: u64,
    pub state: SessionState,
    pub last_error: Option<ErrorKind>,
    pub target: Option<String>,
    pub device_id: Option<String>,
    /// An opened device handle is held
    pub has_device: bool,
    /// A background worker is attached
    pub has_worker: bool,
    /// Repeating capture is running
    pub capturing: bool,
    /// Publish setup has begun and the transport has not been stopped
    pub publishing: bool,
}

impl SessionSnapshot {
    /// Check that nothing is held
    pub fn is_released(&self) -> bool {
        !self.has_device && !self.has_worker && !self.capturing && !self.publishing
    }
}
