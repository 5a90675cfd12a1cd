//! Shared harness for controller integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use livecast_core::{
    Config, ErrorKind, SessionEvent, SessionState, StreamSessionController, Surface,
};
use livecast_sim::{LoopbackTransport, ScriptedPermissionAuthority, SimulatedCameraProvider};
use tokio::sync::broadcast;

pub const TARGET: &str = "rtmp://localhost:1935/live/test";

const WAIT: Duration = Duration::from_secs(5);

pub struct Harness {
    pub controller: StreamSessionController,
    pub camera: Arc<SimulatedCameraProvider>,
    pub permissions: Arc<ScriptedPermissionAuthority>,
    pub transport: Arc<LoopbackTransport>,
    pub events: broadcast::Receiver<SessionEvent>,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.device.open_timeout_ms = 2_000;
    config.device.worker_join_timeout_ms = 1_000;
    config.publish.connect_timeout_ms = 2_000;
    config.events.capacity = 256;
    config
}

impl Harness {
    /// Harness with a preview surface attached
    pub async fn new(
        config: Config,
        camera: SimulatedCameraProvider,
        permissions: ScriptedPermissionAuthority,
        transport: LoopbackTransport,
    ) -> Self {
        let harness = Self::without_surface(config, camera, permissions, transport);
        harness
            .controller
            .attach_surface(Surface::new("preview", 1280, 720))
            .await;
        harness
    }

    pub fn without_surface(
        config: Config,
        camera: SimulatedCameraProvider,
        permissions: ScriptedPermissionAuthority,
        transport: LoopbackTransport,
    ) -> Self {
        let camera = Arc::new(camera);
        let permissions = Arc::new(permissions);
        let transport = Arc::new(transport);

        let controller = StreamSessionController::new(
            config,
            camera.clone(),
            permissions.clone(),
            transport.clone(),
        );
        let events = controller.subscribe();

        Self {
            controller,
            camera,
            permissions,
            transport,
            events,
        }
    }

    /// Granted permission, working camera and transport
    pub async fn granted() -> Self {
        Self::new(
            test_config(),
            SimulatedCameraProvider::new(),
            ScriptedPermissionAuthority::granted(),
            LoopbackTransport::new(),
        )
        .await
    }

    pub async fn wait_for(&self, state: SessionState) {
        let mut rx = self.controller.subscribe_state();
        tokio::time::timeout(WAIT, rx.wait_for(|s| *s == state))
            .await
            .unwrap_or_else(|_| {
                panic!(
                    "Timed out waiting for {}, state is {}",
                    state,
                    self.controller.state()
                )
            })
            .expect("state channel closed");
    }

    /// Start and wait until the stream is live
    pub async fn start_publishing(&self) {
        self.controller
            .request_start(TARGET)
            .await
            .expect("start rejected");
        self.wait_for(SessionState::Publishing).await;
    }

    /// Drain every event received so far
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub async fn assert_released(&self) {
        let snapshot = self.controller.snapshot().await;
        assert!(snapshot.is_released(), "Resources still held: {:?}", snapshot);
        assert_eq!(self.camera.stats().live_devices(), 0, "Camera left open");
        assert!(!self.transport_streaming(), "Transport still streaming");
    }

    fn transport_streaming(&self) -> bool {
        use livecast_core::PublishTransport;
        self.transport.is_streaming()
    }
}

pub fn transitions(events: &[SessionEvent]) -> Vec<(SessionState, SessionState)> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::StateChanged { from, to, .. } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

pub fn errors(events: &[SessionEvent]) -> Vec<ErrorKind> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Error { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect()
}

/// Poll `check` until it holds or the wait expires
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "Condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
