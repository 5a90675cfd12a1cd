//! Scripted permission prompt

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use livecast_core::{Permission, PermissionAuthority, PermissionResponder, PermissionStatus};

/// Permission authority whose answers are scripted by the host or a test
///
/// With an automatic answer configured, every prompt is answered on a
/// spawned task. Otherwise the prompt stays pending until
/// [`respond`](Self::respond) is called.
pub struct ScriptedPermissionAuthority {
    status: Mutex<PermissionStatus>,
    auto_answer: Option<bool>,
    pending: Mutex<Option<PermissionResponder>>,
    requests: AtomicUsize,
}

impl ScriptedPermissionAuthority {
    fn with_status(status: PermissionStatus, auto_answer: Option<bool>) -> Self {
        Self {
            status: Mutex::new(status),
            auto_answer,
            pending: Mutex::new(None),
            requests: AtomicUsize::new(0),
        }
    }

    /// Permission already granted; no prompt is shown
    pub fn granted() -> Self {
        Self::with_status(PermissionStatus::Granted, None)
    }

    /// Permission not granted; prompts wait for [`respond`](Self::respond)
    pub fn prompting() -> Self {
        Self::with_status(PermissionStatus::Denied, None)
    }

    /// Permission not granted; every prompt is answered with `granted`
    pub fn answering(granted: bool) -> Self {
        Self::with_status(PermissionStatus::Denied, Some(granted))
    }

    pub fn set_status(&self, status: PermissionStatus) {
        *self.status.lock() = status;
    }

    /// Number of prompts shown
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Check if a prompt is waiting for an answer
    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Answer the pending prompt
    ///
    /// Returns false when no prompt is pending.
    pub async fn respond(&self, granted: bool) -> bool {
        let responder = self.pending.lock().take();
        match responder {
            Some(responder) => {
                if granted {
                    self.set_status(PermissionStatus::Granted);
                }
                responder.respond(granted).await;
                true
            }
            None => false,
        }
    }
}

impl PermissionAuthority for ScriptedPermissionAuthority {
    fn check(&self, _permission: Permission) -> PermissionStatus {
        *self.status.lock()
    }

    fn request(&self, permission: Permission, responder: PermissionResponder) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(%permission, generation = responder.generation(), "Permission prompt shown");

        match self.auto_answer {
            Some(granted) => {
                if granted {
                    self.set_status(PermissionStatus::Granted);
                }
                tokio::spawn(responder.respond(granted));
            }
            None => {
                *self.pending.lock() = Some(responder);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_status() {
        let authority = ScriptedPermissionAuthority::granted();
        assert!(authority.check(Permission::Camera).is_granted());

        let authority = ScriptedPermissionAuthority::prompting();
        assert!(!authority.check(Permission::Camera).is_granted());
        assert!(!authority.has_pending());
        assert_eq!(authority.requests(), 0);

        authority.set_status(PermissionStatus::Granted);
        assert!(authority.check(Permission::Camera).is_granted());
    }

    #[test]
    fn test_respond_without_prompt() {
        let authority = ScriptedPermissionAuthority::prompting();
        assert!(!tokio_test::block_on(authority.respond(true)));
        assert!(!authority.check(Permission::Camera).is_granted());
    }
}
