//! Permission authority collaborator

use std::sync::Weak;

use serde::{Deserialize, Serialize};

use crate::controller::Inner;

/// Runtime permission the controller needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Camera,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Permission::Camera => write!(f, "camera"),
        }
    }
}

/// Result of a permission check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }
}

/// Platform permission authority
///
/// `request` is called with the controller's state lock held, so it must
/// not wait on the controller. Authorities that answer immediately should
/// hand the responder to a spawned task.
pub trait PermissionAuthority: Send + Sync {
    /// Check whether `permission` is already granted
    fn check(&self, permission: Permission) -> PermissionStatus;

    /// Ask the user for `permission`; the answer goes through `responder`
    fn request(&self, permission: Permission, responder: PermissionResponder);
}

/// One-shot answer channel for a pending permission request
///
/// Consumed by [`respond`](Self::respond), so a request is answered at most
/// once. Answers for a session that has since been stopped or restarted are
/// ignored.
pub struct PermissionResponder {
    generation: u64,
    permission: Permission,
    controller: Weak<Inner>,
}

impl PermissionResponder {
    pub(crate) fn new(generation: u64, permission: Permission, controller: Weak<Inner>) -> Self {
        Self {
            generation,
            permission,
            controller,
        }
    }

    /// Permission being asked for
    pub fn permission(&self) -> Permission {
        self.permission
    }

    /// Session generation the request belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver the user's answer to the controller
    pub async fn respond(self, granted: bool) {
        match self.controller.upgrade() {
            Some(inner) => inner.permission_result(Some(self.generation), granted).await,
            None => tracing::debug!(
                generation = self.generation,
                "Controller dropped before permission answer"
            ),
        }
    }
}

impl std::fmt::Debug for PermissionResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionResponder")
            .field("generation", &self.generation)
            .field("permission", &self.permission)
            .finish()
    }
}
