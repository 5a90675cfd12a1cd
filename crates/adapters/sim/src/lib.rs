//! Simulated collaborators for Livecast
//!
//! In-process stand-ins for the platform camera stack, the permission
//! prompt and the publish transport. Each one is scriptable (succeed, fail,
//! hang, answer later) and counts the calls it receives, so hosts can run
//! the controller without hardware and tests can assert on resource
//! release.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use livecast_core::{Config, StreamSessionController};
//! use livecast_sim::{LoopbackTransport, ScriptedPermissionAuthority, SimulatedCameraProvider};
//!
//! let camera = Arc::new(SimulatedCameraProvider::new());
//! let controller = StreamSessionController::new(
//!     Config::default(),
//!     camera.clone(),
//!     Arc::new(ScriptedPermissionAuthority::granted()),
//!     Arc::new(LoopbackTransport::new()),
//! );
//! ```

mod camera;
mod permission;
mod transport;

pub use camera::{CameraStats, OpenBehavior, SimulatedCamera, SimulatedCameraProvider};
pub use permission::ScriptedPermissionAuthority;
pub use transport::{ConnectBehavior, LoopbackTransport};
