//! Streaming session controller
//!
//! [`StreamSessionController`] is the single writer of the session state.
//! Host calls and device callbacks are serialized through one async mutex;
//! observers read snapshots, a `watch` channel of the current state, or the
//! event broadcast. The publish connect is the one step that runs without
//! the lock. It is raced against stop requests and device loss, and its
//! result is dropped if the session moved on meanwhile.
//!
//! Every terminal transition releases the transport, the capture device and
//! the background worker before control returns to the caller. Release
//! failures are logged and never block teardown.

use std::sync::{Arc, Weak};

use tokio::sync::{broadcast, watch, Mutex};
use url::Url;

use crate::config::Config;
use crate::device::{
    CaptureDevice, CaptureDeviceProvider, CaptureRequest, CaptureTemplate, DeviceCallbacks,
    DeviceError, DeviceEvent, Surface,
};
use crate::error::{ErrorKind, SessionError};
use crate::events::{SessionEvent, SessionSnapshot};
use crate::permission::{Permission, PermissionAuthority, PermissionResponder};
use crate::state::SessionState;
use crate::transport::PublishTransport;
use crate::worker::BackgroundWorker;

/// Drives one capture-to-publish session at a time
///
/// Cheap to clone; clones share the same session.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use livecast_core::{Config, StreamSessionController, Surface};
///
/// let controller = StreamSessionController::new(Config::default(), devices, permissions, transport);
/// controller.attach_surface(Surface::new("preview", 1280, 720)).await;
/// controller.request_start("rtmp://localhost:1935/live/stream").await?;
///
/// // ... later, from the host's teardown hook
/// controller.on_host_teardown().await;
/// ```
#[derive(Clone)]
pub struct StreamSessionController {
    inner: Arc<Inner>,
}

impl StreamSessionController {
    /// Create a controller over the given collaborators
    pub fn new(
        config: Config,
        devices: Arc<dyn CaptureDeviceProvider>,
        permissions: Arc<dyn PermissionAuthority>,
        transport: Arc<dyn PublishTransport>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let (events_tx, _) = broadcast::channel(config.events.capacity.max(1));
        let (stop_epoch, _) = watch::channel(0u64);

        let inner = Arc::new_cyclic(|weak| Inner {
            config,
            devices,
            permissions,
            transport,
            session: Mutex::new(Session::default()),
            state_tx,
            events_tx,
            stop_epoch,
            self_ref: weak.clone(),
        });

        Self { inner }
    }

    /// Start a session publishing to `target`
    ///
    /// Accepted from `Idle`, `Closed` and `Failed`. Returns once the session
    /// is waiting on the permission prompt or the device open; later
    /// progress is reported through [`subscribe`](Self::subscribe). Fails
    /// immediately with [`SessionError::Failed`] when no device can even be
    /// requested.
    pub async fn request_start(&self, target: &str) -> Result<(), SessionError> {
        self.inner.start(target).await
    }

    /// Stop the running session
    ///
    /// A no-op returning `Ok` when nothing is running, including while a
    /// previous stop is in progress.
    pub async fn request_stop(&self) -> Result<(), SessionError> {
        self.inner.stop().await;
        Ok(())
    }

    /// Deliver the answer to a pending permission prompt
    ///
    /// Ignored unless the session is in `PermissionPending`.
    pub async fn on_permission_result(&self, granted: bool) {
        self.inner.permission_result(None, granted).await;
    }

    /// Host teardown hook
    ///
    /// Leaves the session `Closed` with every resource released, whatever
    /// state it was in.
    pub async fn on_host_teardown(&self) {
        self.inner.teardown().await;
    }

    /// Host pause hook: stop the session and remember its target
    pub async fn on_host_pause(&self) {
        self.inner.pause().await;
    }

    /// Host resume hook: restart a session stopped by [`on_host_pause`](Self::on_host_pause)
    pub async fn on_host_resume(&self) -> Result<(), SessionError> {
        self.inner.resume().await
    }

    /// Bind the preview surface used by the next capture session
    pub async fn attach_surface(&self, surface: Surface) {
        let mut session = self.inner.session.lock().await;
        tracing::debug!(surface = %surface.id, "Preview surface attached");
        session.surface = Some(surface);
    }

    /// Remove the preview surface, stopping a running session
    pub async fn detach_surface(&self) {
        self.inner.interrupt();
        {
            let mut session = self.inner.session.lock().await;
            session.surface = None;
        }
        tracing::debug!("Preview surface detached");
        self.inner.stop().await;
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        *self.inner.state_tx.borrow()
    }

    /// Watch the current state
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    /// Subscribe to state changes and error notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Point-in-time view of the session
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.session.lock().await.snapshot()
    }

    /// Error that ended the last failed session
    pub async fn last_error(&self) -> Option<ErrorKind> {
        self.inner.session.lock().await.last_error
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}

impl std::fmt::Debug for StreamSessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSessionController")
            .field("state", &self.state())
            .finish()
    }
}

/// Mutable session record, guarded by `Inner::session`
#[derive(Default)]
struct Session {
    generation: u64,
    state: SessionState,
    target: Option<Url>,
    device_id: Option<String>,
    device: Option<Box<dyn CaptureDevice>>,
    capturing: bool,
    publishing: bool,
    worker: Option<BackgroundWorker>,
    last_error: Option<ErrorKind>,
    surface: Option<Surface>,
    /// Stop epoch observed when the session started
    start_epoch: u64,
    /// Raised by the device callbacks on error or disconnection
    device_lost: Option<watch::Receiver<bool>>,
    resume_target: Option<Url>,
}

impl Session {
    fn take_held(&mut self) -> Held {
        self.device_lost = None;
        Held {
            device: self.device.take(),
            capturing: std::mem::take(&mut self.capturing),
            publishing: std::mem::take(&mut self.publishing),
            worker: self.worker.take(),
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            generation: self.generation,
            state: self.state,
            last_error: self.last_error,
            target: self.target.as_ref().map(|u| u.to_string()),
            device_id: self.device_id.clone(),
            has_device: self.device.is_some(),
            has_worker: self.worker.is_some(),
            capturing: self.capturing,
            publishing: self.publishing,
        }
    }
}

/// Resources taken out of a session for release
struct Held {
    device: Option<Box<dyn CaptureDevice>>,
    capturing: bool,
    publishing: bool,
    worker: Option<BackgroundWorker>,
}

/// Who is tearing the worker down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Caller {
    Host,
    Worker,
}

/// How a publish connect ended
enum ConnectOutcome {
    Connected,
    Failed(ErrorKind),
    /// A stop request or device loss won the race; their own path cleans up
    Interrupted,
}

pub(crate) struct Inner {
    config: Config,
    devices: Arc<dyn CaptureDeviceProvider>,
    permissions: Arc<dyn PermissionAuthority>,
    transport: Arc<dyn PublishTransport>,
    session: Mutex<Session>,
    state_tx: watch::Sender<SessionState>,
    events_tx: broadcast::Sender<SessionEvent>,
    /// Bumped by every stop request before it takes the lock
    stop_epoch: watch::Sender<u64>,
    self_ref: Weak<Inner>,
}

impl Inner {
    async fn start(&self, target: &str) -> Result<(), SessionError> {
        let target = self.validate_target(target)?;

        let mut session = self.session.lock().await;
        if !session.state.accepts_start() {
            return Err(SessionError::AlreadyActive(session.state));
        }
        session.generation += 1;
        if session.state.is_terminal() {
            self.advance(&mut session, SessionState::Idle);
        }

        session.last_error = None;
        session.device_id = None;
        session.resume_target = None;
        session.start_epoch = *self.stop_epoch.borrow();
        tracing::info!(
            generation = session.generation,
            target = %target,
            "Starting session"
        );
        session.target = Some(target);

        if self.permissions.check(Permission::Camera).is_granted() {
            if let Err(kind) = self.open_device(&mut session) {
                let worker = self.fail_locked(&mut session, kind).await;
                drop(session);
                self.finish_worker(worker, Caller::Host).await;
                return Err(kind.into());
            }
        } else {
            self.advance(&mut session, SessionState::PermissionPending);
            let responder = PermissionResponder::new(
                session.generation,
                Permission::Camera,
                self.self_ref.clone(),
            );
            self.permissions.request(Permission::Camera, responder);
        }

        Ok(())
    }

    /// Cut short a publish connect in flight
    fn interrupt(&self) {
        self.stop_epoch.send_modify(|epoch| *epoch += 1);
    }

    async fn stop(&self) {
        self.stop_session().await;
    }

    /// Stop an active session; returns the target it was publishing to
    async fn stop_session(&self) -> Option<Url> {
        self.interrupt();

        let (worker, target) = {
            let mut session = self.session.lock().await;
            if !session.state.is_active() {
                tracing::debug!(state = %session.state, "Stop ignored, nothing running");
                return None;
            }
            tracing::info!(generation = session.generation, "Stopping session");
            let target = session.target.clone();
            (self.stop_locked(&mut session, None).await, target)
        };

        self.finish_worker(worker, Caller::Host).await;
        target
    }

    async fn teardown(&self) {
        self.stop().await;

        let mut session = self.session.lock().await;
        if matches!(session.state, SessionState::Idle | SessionState::Failed) {
            self.advance(&mut session, SessionState::Closed);
        }
        session.resume_target = None;
        tracing::info!(generation = session.generation, "Host teardown complete");
    }

    async fn pause(&self) {
        if let Some(target) = self.stop_session().await {
            let mut session = self.session.lock().await;
            tracing::debug!(target = %target, "Session paused");
            session.resume_target = Some(target);
        }
    }

    async fn resume(&self) -> Result<(), SessionError> {
        let target = self.session.lock().await.resume_target.take();
        match target {
            Some(target) => self.start(target.as_str()).await,
            None => Ok(()),
        }
    }

    /// Apply a permission answer
    ///
    /// `generation` is `None` for answers routed by the host, which always
    /// refer to the current request.
    pub(crate) async fn permission_result(&self, generation: Option<u64>, granted: bool) {
        let worker = {
            let mut session = self.session.lock().await;
            if session.state != SessionState::PermissionPending {
                tracing::debug!(state = %session.state, "Permission result ignored");
                return;
            }
            if generation.is_some_and(|g| g != session.generation) {
                tracing::debug!(generation, "Permission result for stale session ignored");
                return;
            }

            if granted {
                tracing::info!(generation = session.generation, "Camera permission granted");
                match self.open_device(&mut session) {
                    Ok(()) => None,
                    Err(kind) => self.fail_locked(&mut session, kind).await,
                }
            } else {
                tracing::warn!(generation = session.generation, "Camera permission denied");
                self.fail_locked(&mut session, ErrorKind::PermissionDenied)
                    .await
            }
        };

        self.finish_worker(worker, Caller::Host).await;
    }

    /// Dispatch a device callback; runs on the background worker
    pub(crate) async fn device_event(&self, generation: u64, event: DeviceEvent) {
        match event {
            DeviceEvent::Opened(device) => self.device_opened(generation, device).await,
            DeviceEvent::Error { code } => self.device_error(generation, code).await,
            DeviceEvent::Disconnected { code } => self.device_disconnected(generation, code).await,
        }
    }

    async fn device_opened(&self, generation: u64, mut device: Box<dyn CaptureDevice>) {
        let mut session = self.session.lock().await;
        if session.generation != generation || session.state != SessionState::DeviceOpening {
            drop(session);
            tracing::debug!(generation, device = device.id(), "Closing device delivered to a stale session");
            if let Err(e) = device.close().await {
                tracing::warn!(generation, "Failed to close stale device: {}", e);
            }
            return;
        }

        tracing::info!(generation, device = device.id(), "Capture device opened");
        session.device = Some(device);
        self.advance(&mut session, SessionState::PreviewActive);

        let prepared = match self.start_preview(&mut session).await {
            Ok(()) => self.prepare_publish(&mut session),
            Err(kind) => Err(kind),
        };
        let target = match prepared {
            Ok(target) => target,
            Err(kind) => {
                let worker = self.fail_locked(&mut session, kind).await;
                drop(session);
                self.finish_worker(worker, Caller::Worker).await;
                return;
            }
        };
        let start_epoch = session.start_epoch;
        let device_lost = session.device_lost.clone();
        drop(session);

        let outcome = self
            .connect_transport(generation, &target, start_epoch, device_lost)
            .await;

        let mut session = self.session.lock().await;
        if session.generation != generation || session.state != SessionState::PreviewActive {
            drop(session);
            if matches!(outcome, ConnectOutcome::Connected) {
                // The stop path already ran stop_stream before this connect finished
                tracing::debug!(generation, "Session ended while connecting, stopping transport");
                if let Err(e) = self.transport.stop_stream().await {
                    tracing::warn!(generation, "Failed to stop publish transport: {}", e);
                }
            }
            return;
        }

        let worker = match outcome {
            ConnectOutcome::Connected => {
                tracing::info!(generation, target = %target, "Publishing");
                self.advance(&mut session, SessionState::Publishing);
                None
            }
            ConnectOutcome::Interrupted => None,
            ConnectOutcome::Failed(kind) => self.fail_locked(&mut session, kind).await,
        };
        drop(session);

        self.finish_worker(worker, Caller::Worker).await;
    }

    pub(crate) async fn device_error(&self, generation: u64, code: i32) {
        let worker = {
            let mut session = self.session.lock().await;
            if session.generation != generation || !session.state.may_hold_device() {
                tracing::debug!(generation, code, "Device error for inactive session ignored");
                return;
            }
            tracing::warn!(generation, code, "Capture device error");
            self.fail_locked(&mut session, ErrorKind::DeviceUnavailable)
                .await
        };

        self.finish_worker(worker, Caller::Worker).await;
    }

    async fn device_disconnected(&self, generation: u64, code: Option<i32>) {
        let worker = {
            let mut session = self.session.lock().await;
            if session.generation != generation || !session.state.may_hold_device() {
                tracing::debug!(generation, "Disconnect for inactive session ignored");
                return;
            }
            tracing::warn!(generation, code, "Capture device disconnected");
            let failure = code.map(|_| ErrorKind::DeviceDisconnected);
            self.stop_locked(&mut session, failure).await
        };

        self.finish_worker(worker, Caller::Worker).await;
    }

    pub(crate) async fn device_open_timed_out(&self, generation: u64) {
        let worker = {
            let mut session = self.session.lock().await;
            if session.generation != generation || session.state != SessionState::DeviceOpening {
                return;
            }
            tracing::warn!(
                generation,
                timeout_ms = self.config.device.open_timeout_ms,
                "Capture device did not open in time"
            );
            self.fail_locked(&mut session, ErrorKind::Timeout).await
        };

        self.finish_worker(worker, Caller::Worker).await;
    }

    fn validate_target(&self, target: &str) -> Result<Url, SessionError> {
        let invalid = |reason: String| SessionError::InvalidTarget {
            target: target.to_string(),
            reason,
        };

        let url = Url::parse(target).map_err(|e| invalid(e.to_string()))?;

        let allowed = &self.config.publish.allowed_schemes;
        if !allowed.iter().any(|s| s.eq_ignore_ascii_case(url.scheme())) {
            return Err(invalid(format!(
                "scheme '{}' not allowed, expected one of: {}",
                url.scheme(),
                allowed.join(", ")
            )));
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(invalid("missing host".to_string()));
        }

        Ok(url)
    }

    fn select_device(&self) -> Result<String, DeviceError> {
        let devices = self.devices.list_devices()?;

        match &self.config.device.device_id {
            Some(id) => devices
                .iter()
                .find(|d| &d.id == id)
                .map(|d| d.id.clone())
                .ok_or_else(|| DeviceError::NotFound(id.clone())),
            None => devices
                .first()
                .map(|d| d.id.clone())
                .ok_or_else(|| DeviceError::NotFound("no cameras available".to_string())),
        }
    }

    /// Enter `DeviceOpening`: spawn the worker and request the open
    fn open_device(&self, session: &mut Session) -> Result<(), ErrorKind> {
        self.advance(session, SessionState::DeviceOpening);

        let device_id = self.select_device().map_err(|e| {
            tracing::warn!(generation = session.generation, "No usable capture device: {}", e);
            ErrorKind::DeviceUnavailable
        })?;
        session.device_id = Some(device_id.clone());

        let (callbacks, events) = DeviceCallbacks::channel(session.generation);
        session.device_lost = Some(callbacks.loss_signal());
        session.worker = Some(BackgroundWorker::spawn(
            session.generation,
            events,
            self.config.device.open_timeout(),
            self.self_ref.clone(),
        ));

        tracing::debug!(generation = session.generation, device = %device_id, "Opening capture device");
        self.devices.open(&device_id, callbacks).map_err(|e| {
            tracing::warn!(generation = session.generation, "Device open rejected: {}", e);
            ErrorKind::DeviceUnavailable
        })
    }

    /// Bind the preview surface and start the repeating request
    async fn start_preview(&self, session: &mut Session) -> Result<(), ErrorKind> {
        let generation = session.generation;
        let surface = session.surface.clone().ok_or_else(|| {
            tracing::warn!(generation, "No preview surface attached");
            ErrorKind::ConfigurationFailed
        })?;
        let device = session
            .device
            .as_mut()
            .ok_or(ErrorKind::DeviceUnavailable)?;

        device
            .create_capture_session(std::slice::from_ref(&surface))
            .await
            .map_err(|e| {
                tracing::warn!(generation, "Capture session configuration failed: {}", e);
                ErrorKind::ConfigurationFailed
            })?;

        let request = CaptureRequest::new(CaptureTemplate::Preview).add_target(surface);
        device.set_repeating_request(request).await.map_err(|e| {
            tracing::warn!(generation, "Repeating capture request failed: {}", e);
            ErrorKind::ConfigurationFailed
        })?;

        session.capturing = true;
        tracing::debug!(generation, "Preview running");
        Ok(())
    }

    /// Prepare the encoders; returns the target to connect to
    fn prepare_publish(&self, session: &mut Session) -> Result<Url, ErrorKind> {
        let generation = session.generation;
        let target = session
            .target
            .clone()
            .ok_or(ErrorKind::PublishConnectFailed)?;

        // From here on a stop must call stop_stream
        session.publishing = true;

        if self.config.audio.enabled {
            self.transport
                .prepare_audio(&self.config.audio)
                .map_err(|e| {
                    tracing::warn!(generation, "Audio encoder setup failed: {}", e);
                    ErrorKind::ConfigurationFailed
                })?;
        }
        self.transport
            .prepare_video(&self.config.video)
            .map_err(|e| {
                tracing::warn!(generation, "Video encoder setup failed: {}", e);
                ErrorKind::ConfigurationFailed
            })?;

        Ok(target)
    }

    /// Connect the transport, racing the connect against stop requests and
    /// device loss
    ///
    /// Runs without the session lock.
    async fn connect_transport(
        &self,
        generation: u64,
        target: &Url,
        start_epoch: u64,
        device_lost: Option<watch::Receiver<bool>>,
    ) -> ConnectOutcome {
        let mut stop_rx = self.stop_epoch.subscribe();
        let stopped = async move {
            let changed = stop_rx.wait_for(|epoch| *epoch != start_epoch).await;
            changed.is_ok()
        };
        let lost = async move {
            let Some(mut lost) = device_lost else {
                return false;
            };
            let raised = lost.wait_for(|lost| *lost).await;
            raised.is_ok()
        };

        let deadline = self.config.publish.connect_timeout();
        let connect = async {
            let connect = self.transport.connect(target);
            match deadline {
                Some(deadline) => tokio::time::timeout(deadline, connect).await.ok(),
                None => Some(connect.await),
            }
        };

        tracing::debug!(generation, target = %target, "Connecting publish transport");
        tokio::select! {
            true = stopped => {
                tracing::debug!(generation, "Publish connect interrupted by stop");
                ConnectOutcome::Interrupted
            }
            true = lost => {
                tracing::debug!(generation, "Publish connect interrupted by device loss");
                ConnectOutcome::Interrupted
            }
            result = connect => match result {
                Some(Ok(())) => ConnectOutcome::Connected,
                Some(Err(e)) => {
                    tracing::warn!(generation, "Publish connect failed: {}", e);
                    ConnectOutcome::Failed(ErrorKind::PublishConnectFailed)
                }
                None => {
                    tracing::warn!(
                        generation,
                        timeout_ms = self.config.publish.connect_timeout_ms,
                        "Publish connect timed out"
                    );
                    ConnectOutcome::Failed(ErrorKind::Timeout)
                }
            }
        }
    }

    /// Release everything and end in `Failed`; returns the worker to finish
    async fn fail_locked(
        &self,
        session: &mut Session,
        kind: ErrorKind,
    ) -> Option<BackgroundWorker> {
        let mut held = session.take_held();
        self.release(session.generation, &mut held).await;

        session.last_error = Some(kind);
        self.advance(session, SessionState::Failed);
        let _ = self
            .events_tx
            .send(SessionEvent::error(session.generation, kind));
        tracing::warn!(generation = session.generation, error = %kind, "Session failed");

        held.worker
    }

    /// Walk `Stopping` and end in `Closed`, or `Failed` when `failure` is set
    async fn stop_locked(
        &self,
        session: &mut Session,
        failure: Option<ErrorKind>,
    ) -> Option<BackgroundWorker> {
        self.advance(session, SessionState::Stopping);

        let mut held = session.take_held();
        self.release(session.generation, &mut held).await;

        match failure {
            Some(kind) => {
                session.last_error = Some(kind);
                self.advance(session, SessionState::Failed);
                let _ = self
                    .events_tx
                    .send(SessionEvent::error(session.generation, kind));
                tracing::warn!(generation = session.generation, error = %kind, "Session failed");
            }
            None => self.advance(session, SessionState::Closed),
        }

        held.worker
    }

    /// Stop the transport, stop capture, close the device
    ///
    /// Each step runs even if an earlier one failed.
    async fn release(&self, generation: u64, held: &mut Held) {
        if held.publishing {
            if let Err(e) = self.transport.stop_stream().await {
                tracing::warn!(generation, "Failed to stop publish transport: {}", e);
            }
        }

        if let Some(mut device) = held.device.take() {
            if held.capturing {
                if let Err(e) = device.stop_repeating().await {
                    tracing::warn!(generation, "Failed to stop repeating capture: {}", e);
                }
            }
            if let Err(e) = device.close().await {
                tracing::warn!(generation, "Failed to close capture device: {}", e);
            }
            tracing::debug!(generation, "Capture device released");
        }
    }

    async fn finish_worker(&self, worker: Option<BackgroundWorker>, caller: Caller) {
        match (worker, caller) {
            (Some(worker), Caller::Host) => {
                worker
                    .quit(self.config.device.worker_join_timeout())
                    .await
            }
            (Some(worker), Caller::Worker) => worker.detach(),
            (None, _) => {}
        }
    }

    fn advance(&self, session: &mut Session, to: SessionState) {
        let from = session.state;
        debug_assert!(
            from.can_transition_to(to),
            "illegal session transition {} -> {}",
            from,
            to
        );

        session.state = to;
        self.state_tx.send_replace(to);
        let _ = self
            .events_tx
            .send(SessionEvent::state_changed(session.generation, from, to));
        tracing::info!(
            generation = session.generation,
            from = %from,
            to = %to,
            "Session state changed"
        );
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let session = self.session.get_mut();
        if session.device.is_some() || session.worker.is_some() {
            tracing::warn!(
                generation = session.generation,
                state = %session.state,
                "Controller dropped while holding session resources; call on_host_teardown first"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AudioConfig, VideoConfig};
    use crate::device::DeviceInfo;
    use crate::permission::PermissionStatus;
    use crate::transport::TransportError;
    use async_trait::async_trait;

    struct NoDevices;

    impl CaptureDeviceProvider for NoDevices {
        fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
            Ok(Vec::new())
        }

        fn open(&self, device_id: &str, _: DeviceCallbacks) -> Result<(), DeviceError> {
            Err(DeviceError::NotFound(device_id.to_string()))
        }
    }

    struct Granted;

    impl PermissionAuthority for Granted {
        fn check(&self, _: Permission) -> PermissionStatus {
            PermissionStatus::Granted
        }

        fn request(&self, _: Permission, _: PermissionResponder) {}
    }

    struct NullTransport;

    #[async_trait]
    impl PublishTransport for NullTransport {
        fn prepare_audio(&self, _: &AudioConfig) -> Result<(), TransportError> {
            Ok(())
        }

        fn prepare_video(&self, _: &VideoConfig) -> Result<(), TransportError> {
            Ok(())
        }

        async fn connect(&self, _: &Url) -> Result<(), TransportError> {
            Ok(())
        }

        fn is_streaming(&self) -> bool {
            false
        }

        async fn stop_stream(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn controller() -> StreamSessionController {
        StreamSessionController::new(
            Config::default(),
            Arc::new(NoDevices),
            Arc::new(Granted),
            Arc::new(NullTransport),
        )
    }

    #[tokio::test]
    async fn test_rejects_invalid_targets_without_state_change() {
        let controller = controller();

        let err = controller.request_start("not a url").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidTarget { .. }));

        let err = controller
            .request_start("http://example.com/live")
            .await
            .unwrap_err();
        match err {
            SessionError::InvalidTarget { reason, .. } => assert!(reason.contains("http")),
            other => panic!("Expected InvalidTarget, got {:?}", other),
        }

        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(controller.snapshot().await.generation, 0);
    }

    #[tokio::test]
    async fn test_no_devices_fails_synchronously() {
        let controller = controller();
        let mut events = controller.subscribe();

        let err = controller
            .request_start("rtmp://localhost/live/key")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::DeviceUnavailable));
        assert_eq!(controller.state(), SessionState::Failed);

        let snapshot = controller.snapshot().await;
        assert!(snapshot.is_released());
        assert_eq!(snapshot.last_error, Some(ErrorKind::DeviceUnavailable));

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::Error { kind, .. } = event {
                kinds.push(kind);
            }
        }
        assert_eq!(kinds, vec![ErrorKind::DeviceUnavailable]);
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let controller = controller();
        tokio_test::assert_ok!(controller.request_stop().await);
        tokio_test::assert_ok!(controller.request_stop().await);
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_teardown_from_idle_closes() {
        let controller = controller();
        controller.on_host_teardown().await;
        assert_eq!(controller.state(), SessionState::Closed);
        assert!(controller.snapshot().await.is_released());
    }

    #[tokio::test]
    async fn test_resume_without_pause_is_noop() {
        let controller = controller();
        controller.on_host_resume().await.unwrap();
        assert_eq!(controller.state(), SessionState::Idle);
    }
}
