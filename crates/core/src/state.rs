//! Session lifecycle states
//!
//! Defines [`SessionState`] and the transition table the controller is
//! allowed to walk.

use serde::{Deserialize, Serialize};

/// Lifecycle stage of a streaming session
///
/// `Closed` and `Failed` are terminal; the next start request resets the
/// session to `Idle` implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session has been started yet
    Idle,

    /// Waiting for the user to answer the camera permission prompt
    PermissionPending,

    /// Background worker running, device open requested
    DeviceOpening,

    /// Device open, preview bound, repeating capture running
    PreviewActive,

    /// Transport connected, stream going out
    Publishing,

    /// Releasing transport, capture, device and worker
    Stopping,

    /// Session ended normally, all resources released
    Closed,

    /// Session ended with an error, all resources released
    Failed,
}

impl SessionState {
    /// Check if the state ends a session
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    /// Check if a start request is accepted from this state
    pub fn accepts_start(&self) -> bool {
        matches!(
            self,
            SessionState::Idle | SessionState::Closed | SessionState::Failed
        )
    }

    /// Check if a session is running (anything a stop request would interrupt)
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::PermissionPending
                | SessionState::DeviceOpening
                | SessionState::PreviewActive
                | SessionState::Publishing
        )
    }

    /// Check if a device handle may be held in this state
    pub fn may_hold_device(&self) -> bool {
        matches!(
            self,
            SessionState::DeviceOpening | SessionState::PreviewActive | SessionState::Publishing
        )
    }

    /// Check if `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        match (*self, next) {
            (Idle, PermissionPending) | (Idle, DeviceOpening) => true,
            (PermissionPending, DeviceOpening) | (PermissionPending, Failed) => true,
            (DeviceOpening, PreviewActive) | (DeviceOpening, Failed) => true,
            (PreviewActive, Publishing) | (PreviewActive, Failed) => true,
            (Publishing, Failed) => true,
            (PermissionPending, Stopping)
            | (DeviceOpening, Stopping)
            | (PreviewActive, Stopping)
            | (Publishing, Stopping) => true,
            // A disconnect that carried an error code ends in Failed
            (Stopping, Closed) | (Stopping, Failed) => true,
            (Closed, Idle) | (Failed, Idle) => true,
            // Host teardown with nothing to release
            (Idle, Closed) | (Failed, Closed) => true,
            _ => false,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Idle
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::PermissionPending => "permission_pending",
            SessionState::DeviceOpening => "device_opening",
            SessionState::PreviewActive => "preview_active",
            SessionState::Publishing => "publishing",
            SessionState::Stopping => "stopping",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    const ALL: [SessionState; 8] = [
        Idle,
        PermissionPending,
        DeviceOpening,
        PreviewActive,
        Publishing,
        Stopping,
        Closed,
        Failed,
    ];

    #[test]
    fn test_happy_path_is_legal() {
        let path = [Idle, DeviceOpening, PreviewActive, Publishing, Stopping, Closed, Idle];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be legal",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_every_active_state_can_stop() {
        for state in ALL.iter().filter(|s| s.is_active()) {
            assert!(state.can_transition_to(Stopping), "{} cannot stop", state);
        }
        for state in ALL.iter().filter(|s| !s.is_active()) {
            assert!(!state.can_transition_to(Stopping), "{} should not stop", state);
        }
    }

    #[test]
    fn test_terminal_states_only_reset_or_close() {
        for from in [Closed, Failed] {
            let successors: Vec<_> = ALL
                .iter()
                .copied()
                .filter(|to| from.can_transition_to(*to))
                .collect();
            assert!(successors.contains(&Idle));
            assert!(successors.iter().all(|s| matches!(s, Idle | Closed)));
        }
    }

    #[test]
    fn test_illegal_shortcuts() {
        assert!(!Idle.can_transition_to(Publishing));
        assert!(!PermissionPending.can_transition_to(PreviewActive));
        assert!(!DeviceOpening.can_transition_to(Publishing));
        assert!(!Publishing.can_transition_to(PreviewActive));
        assert!(!Stopping.can_transition_to(Idle));
        assert!(!Closed.can_transition_to(DeviceOpening));
    }

    #[test]
    fn test_state_predicates() {
        assert!(Closed.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Stopping.is_terminal());

        assert!(Idle.accepts_start());
        assert!(Failed.accepts_start());
        assert!(!Publishing.accepts_start());
        assert!(!Stopping.accepts_start());

        assert!(DeviceOpening.may_hold_device());
        assert!(Publishing.may_hold_device());
        assert!(!PermissionPending.may_hold_device());
        assert!(!Closed.may_hold_device());
    }

    #[test]
    fn test_state_display_and_serde() {
        assert_eq!(PermissionPending.to_string(), "permission_pending");
        assert_eq!(
            serde_json::to_string(&PreviewActive).unwrap(),
            "\"preview_active\""
        );
        let state: SessionState = serde_json::from_str("\"publishing\"").unwrap();
        assert_eq!(state, Publishing);
    }
}
