//! Livecast core
//!
//! Drives one camera-to-network streaming session through its lifecycle:
//! permission check, capture device acquisition, preview start, publish
//! start, publish stop and device release.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          livecast-core                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  host ──▶ StreamSessionController ──▶ PermissionAuthority        │
//! │             │  (single state lock)                               │
//! │             │ spawns per session                                 │
//! │             ▼                                                    │
//! │  ┌────────────────────┐  DeviceEvent  ┌─────────────────────┐    │
//! │  │ BackgroundWorker   │◀──────────────│ CaptureDeviceProvider│   │
//! │  │ (tokio task)       │               └─────────────────────┘    │
//! │  └─────────┬──────────┘                                          │
//! │            │ publish setup                                       │
//! │            ▼                                                     │
//! │  ┌────────────────────┐                                          │
//! │  │ PublishTransport   │ ──▶ rtmp://host/app/key                  │
//! │  └────────────────────┘                                          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Collaborators are trait objects; `livecast-sim` and
//! `livecast-publish-rtmp` provide implementations.

pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod events;
pub mod permission;
pub mod state;
pub mod transport;

mod worker;

pub use config::{AudioConfig, Config, ConfigError, VideoCodec, VideoConfig};
pub use controller::StreamSessionController;
pub use device::{
    CaptureDevice, CaptureDeviceProvider, CaptureRequest, CaptureTemplate, DeviceCallbacks,
    DeviceError, DeviceEvent, DeviceInfo, Surface,
};
pub use error::{ErrorKind, SessionError};
pub use events::{SessionEvent, SessionSnapshot};
pub use permission::{Permission, PermissionAuthority, PermissionResponder, PermissionStatus};
pub use state::SessionState;
pub use transport::{PublishTransport, TransportError};
