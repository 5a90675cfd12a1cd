//! Simulated camera stack

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use livecast_core::{
    CaptureDevice, CaptureDeviceProvider, CaptureRequest, DeviceCallbacks, DeviceError,
    DeviceInfo, Surface,
};

/// How the provider answers an open request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenBehavior {
    /// Deliver an opened device after the configured latency
    Succeed,

    /// Report a device error code after the configured latency
    Fail { code: i32 },

    /// Accept the request and never answer; see
    /// [`SimulatedCameraProvider::complete_pending_open`]
    Hang,

    /// Refuse the request synchronously
    Reject,
}

/// Call counters shared by a provider and the devices it opens
#[derive(Debug, Default)]
pub struct CameraStats {
    open_requests: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
    sessions_configured: AtomicUsize,
    repeating_started: AtomicUsize,
    repeating_stopped: AtomicUsize,
}

impl CameraStats {
    pub fn open_requests(&self) -> usize {
        self.open_requests.load(Ordering::SeqCst)
    }

    /// Devices delivered to a session
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn sessions_configured(&self) -> usize {
        self.sessions_configured.load(Ordering::SeqCst)
    }

    pub fn repeating_started(&self) -> usize {
        self.repeating_started.load(Ordering::SeqCst)
    }

    pub fn repeating_stopped(&self) -> usize {
        self.repeating_stopped.load(Ordering::SeqCst)
    }

    /// Devices opened and not yet closed
    pub fn live_devices(&self) -> usize {
        self.opened().saturating_sub(self.closed())
    }
}

/// A simulated opened camera
pub struct SimulatedCamera {
    id: String,
    stats: Arc<CameraStats>,
    fail_configure: bool,
    configured: bool,
    repeating: bool,
    closed: bool,
}

#[async_trait]
impl CaptureDevice for SimulatedCamera {
    fn id(&self) -> &str {
        &self.id
    }

    async fn create_capture_session(&mut self, surfaces: &[Surface]) -> Result<(), DeviceError> {
        if self.closed {
            return Err(DeviceError::Closed);
        }
        if self.fail_configure {
            return Err(DeviceError::Configuration(format!(
                "{} rejected the capture session",
                self.id
            )));
        }
        if surfaces.is_empty() {
            return Err(DeviceError::Configuration("no output surfaces".to_string()));
        }

        self.configured = true;
        self.stats.sessions_configured.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(device = %self.id, surfaces = surfaces.len(), "Simulated capture session configured");
        Ok(())
    }

    async fn set_repeating_request(&mut self, request: CaptureRequest) -> Result<(), DeviceError> {
        if !self.configured {
            return Err(DeviceError::Configuration(
                "capture session not configured".to_string(),
            ));
        }
        if request.targets.is_empty() {
            return Err(DeviceError::Configuration("request has no targets".to_string()));
        }

        self.repeating = true;
        self.stats.repeating_started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_repeating(&mut self) -> Result<(), DeviceError> {
        if self.repeating {
            self.repeating = false;
            self.stats.repeating_stopped.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DeviceError> {
        if self.closed {
            return Err(DeviceError::Closed);
        }
        self.closed = true;
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(device = %self.id, "Simulated camera closed");
        Ok(())
    }
}

/// Scriptable in-process camera provider
pub struct SimulatedCameraProvider {
    devices: Vec<DeviceInfo>,
    behavior: Mutex<OpenBehavior>,
    latency: Duration,
    fail_configure: bool,
    stats: Arc<CameraStats>,
    /// Callbacks of the most recent open request
    callbacks: Mutex<Option<(String, DeviceCallbacks)>>,
}

impl SimulatedCameraProvider {
    /// Provider with a back and a front camera that open immediately
    pub fn new() -> Self {
        Self {
            devices: vec![
                DeviceInfo::new("sim-back", "Simulated back camera"),
                DeviceInfo::new("sim-front", "Simulated front camera"),
            ],
            behavior: Mutex::new(OpenBehavior::Succeed),
            latency: Duration::ZERO,
            fail_configure: false,
            stats: Arc::new(CameraStats::default()),
            callbacks: Mutex::new(None),
        }
    }

    pub fn with_devices(mut self, devices: Vec<DeviceInfo>) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_open_behavior(self, behavior: OpenBehavior) -> Self {
        *self.behavior.lock() = behavior;
        self
    }

    /// Delay before an open request is answered
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make opened devices reject capture session configuration
    pub fn with_configure_failure(mut self) -> Self {
        self.fail_configure = true;
        self
    }

    pub fn set_open_behavior(&self, behavior: OpenBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn stats(&self) -> Arc<CameraStats> {
        self.stats.clone()
    }

    fn new_camera(&self, id: &str) -> SimulatedCamera {
        SimulatedCamera {
            id: id.to_string(),
            stats: self.stats.clone(),
            fail_configure: self.fail_configure,
            configured: false,
            repeating: false,
            closed: false,
        }
    }

    /// Answer a request left hanging by [`OpenBehavior::Hang`]
    ///
    /// Returns false when no open request was made.
    pub fn complete_pending_open(&self) -> bool {
        let Some((id, callbacks)) = self.callbacks.lock().clone() else {
            return false;
        };
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        callbacks.opened(Box::new(self.new_camera(&id)));
        true
    }

    /// Simulate the device going away, optionally with an error code
    ///
    /// Returns false when no open request was made.
    pub fn disconnect(&self, code: Option<i32>) -> bool {
        match self.callbacks.lock().as_ref() {
            Some((id, callbacks)) => {
                tracing::debug!(device = %id, ?code, "Simulated camera disconnected");
                callbacks.disconnected(code);
                true
            }
            None => false,
        }
    }

    /// Simulate an asynchronous device error
    pub fn raise_error(&self, code: i32) -> bool {
        match self.callbacks.lock().as_ref() {
            Some((_, callbacks)) => {
                callbacks.error(code);
                true
            }
            None => false,
        }
    }
}

impl Default for SimulatedCameraProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDeviceProvider for SimulatedCameraProvider {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        Ok(self.devices.clone())
    }

    fn open(&self, device_id: &str, callbacks: DeviceCallbacks) -> Result<(), DeviceError> {
        self.stats.open_requests.fetch_add(1, Ordering::SeqCst);

        if !self.devices.iter().any(|d| d.id == device_id) {
            return Err(DeviceError::NotFound(device_id.to_string()));
        }

        let behavior = *self.behavior.lock();
        if behavior == OpenBehavior::Reject {
            return Err(DeviceError::Access(format!("{} is in use", device_id)));
        }

        *self.callbacks.lock() = Some((device_id.to_string(), callbacks.clone()));

        let latency = self.latency;
        match behavior {
            OpenBehavior::Succeed => {
                let camera = self.new_camera(device_id);
                let stats = self.stats.clone();
                tokio::spawn(async move {
                    if !latency.is_zero() {
                        tokio::time::sleep(latency).await;
                    }
                    stats.opened.fetch_add(1, Ordering::SeqCst);
                    callbacks.opened(Box::new(camera));
                });
            }
            OpenBehavior::Fail { code } => {
                tokio::spawn(async move {
                    if !latency.is_zero() {
                        tokio::time::sleep(latency).await;
                    }
                    callbacks.error(code);
                });
            }
            OpenBehavior::Hang | OpenBehavior::Reject => {}
        }

        tracing::debug!(device = %device_id, ?behavior, "Simulated open requested");
        Ok(())
    }
}
