//! Capture device collaborator
//!
//! The controller treats the platform camera stack as an opaque provider
//! with four capabilities: open, configure, capture and close. Device
//! callbacks are delivered as [`DeviceEvent`]s onto the session's background
//! worker through [`DeviceCallbacks`].

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

/// A capture device the provider can open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
}

impl DeviceInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Output surface frames are rendered into (preview view, encoder input)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    pub id: String,
    pub width: u32,
    pub height: u32,
}

impl Surface {
    pub fn new(id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
        }
    }
}

/// Capture request template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTemplate {
    /// Continuous frames for the preview surface
    Preview,
}

/// A repeating capture request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub template: CaptureTemplate,
    pub targets: Vec<Surface>,
}

impl CaptureRequest {
    pub fn new(template: CaptureTemplate) -> Self {
        Self {
            template,
            targets: Vec::new(),
        }
    }

    /// Add an output surface to the request
    pub fn add_target(mut self, surface: Surface) -> Self {
        self.targets.push(surface);
        self
    }
}

/// Errors reported by the device collaborator
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Device access error: {0}")]
    Access(String),

    #[error("Capture configuration error: {0}")]
    Configuration(String),

    #[error("Device already closed")]
    Closed,

    #[error("Device error: {0}")]
    Other(String),
}

/// An opened capture device
///
/// Owned exclusively by the session that opened it.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Identifier of the underlying device
    fn id(&self) -> &str;

    /// Configure a capture session that renders into `surfaces`
    async fn create_capture_session(&mut self, surfaces: &[Surface]) -> Result<(), DeviceError>;

    /// Start a repeating capture request on the configured session
    async fn set_repeating_request(&mut self, request: CaptureRequest) -> Result<(), DeviceError>;

    /// Stop the repeating request
    async fn stop_repeating(&mut self) -> Result<(), DeviceError>;

    /// Close the device
    async fn close(&mut self) -> Result<(), DeviceError>;
}

/// Platform camera stack
pub trait CaptureDeviceProvider: Send + Sync {
    /// List the devices that can be opened
    fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError>;

    /// Request that `device_id` be opened
    ///
    /// Returning `Ok` only means the request was accepted. The outcome
    /// arrives later through `callbacks`: `opened` with the device, `error`
    /// with a platform code, or `disconnected`.
    fn open(&self, device_id: &str, callbacks: DeviceCallbacks) -> Result<(), DeviceError>;
}

/// Device-driven event delivered to the background worker
pub enum DeviceEvent {
    /// The device finished opening
    Opened(Box<dyn CaptureDevice>),

    /// The device reported an error
    Error { code: i32 },

    /// The device went away, with an error code if it failed
    Disconnected { code: Option<i32> },
}

impl std::fmt::Debug for DeviceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceEvent::Opened(device) => f.debug_tuple("Opened").field(&device.id()).finish(),
            DeviceEvent::Error { code } => f.debug_struct("Error").field("code", code).finish(),
            DeviceEvent::Disconnected { code } => {
                f.debug_struct("Disconnected").field("code", code).finish()
            }
        }
    }
}

/// Callback sink bound to one session's background worker
///
/// Cloneable so providers can hand it to their own threads. Events sent
/// after the session ended are dropped, except that a late `opened` device
/// is closed so it cannot leak.
///
/// `error` and `disconnected` also raise a loss flag that is visible before
/// the worker gets to the queued event.
#[derive(Clone)]
pub struct DeviceCallbacks {
    generation: u64,
    tx: mpsc::UnboundedSender<DeviceEvent>,
    lost: Arc<watch::Sender<bool>>,
    runtime: Option<Handle>,
}

impl DeviceCallbacks {
    /// Create a callback sink and the receiving end of its queue
    pub fn channel(generation: u64) -> (Self, mpsc::UnboundedReceiver<DeviceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (lost, _) = watch::channel(false);
        let callbacks = Self {
            generation,
            tx,
            lost: Arc::new(lost),
            runtime: Handle::try_current().ok(),
        };
        (callbacks, rx)
    }

    /// Session generation these callbacks belong to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Check if the receiving worker is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Watch for the device reporting an error or a disconnection
    pub(crate) fn loss_signal(&self) -> watch::Receiver<bool> {
        self.lost.subscribe()
    }

    /// Deliver an opened device
    pub fn opened(&self, device: Box<dyn CaptureDevice>) {
        if let Err(mpsc::error::SendError(DeviceEvent::Opened(mut device))) =
            self.tx.send(DeviceEvent::Opened(device))
        {
            let generation = self.generation;
            tracing::debug!(
                generation,
                device = device.id(),
                "Worker gone, closing late device"
            );
            match &self.runtime {
                Some(runtime) => {
                    runtime.spawn(async move {
                        if let Err(e) = device.close().await {
                            tracing::warn!(generation, "Failed to close late device: {}", e);
                        }
                    });
                }
                None => drop(device),
            }
        }
    }

    /// Deliver a device error code
    pub fn error(&self, code: i32) {
        let _ = self.tx.send(DeviceEvent::Error { code });
        self.lost.send_replace(true);
    }

    /// Deliver a disconnection
    pub fn disconnected(&self, code: Option<i32>) {
        let _ = self.tx.send(DeviceEvent::Disconnected { code });
        self.lost.send_replace(true);
    }
}

impl std::fmt::Debug for DeviceCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCallbacks")
            .field("generation", &self.generation)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlagDevice {
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl CaptureDevice for FlagDevice {
        fn id(&self) -> &str {
            "flag"
        }

        async fn create_capture_session(&mut self, _: &[Surface]) -> Result<(), DeviceError> {
            Ok(())
        }

        async fn set_repeating_request(&mut self, _: CaptureRequest) -> Result<(), DeviceError> {
            Ok(())
        }

        async fn stop_repeating(&mut self) -> Result<(), DeviceError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), DeviceError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_callbacks_deliver_events() {
        let (callbacks, mut rx) = DeviceCallbacks::channel(7);
        assert_eq!(callbacks.generation(), 7);

        callbacks.error(3);
        callbacks.disconnected(None);

        assert!(matches!(rx.recv().await, Some(DeviceEvent::Error { code: 3 })));
        assert!(matches!(
            rx.recv().await,
            Some(DeviceEvent::Disconnected { code: None })
        ));
    }

    #[tokio::test]
    async fn test_loss_signal_raised_by_error_and_disconnect() {
        let (callbacks, _rx) = DeviceCallbacks::channel(1);
        let lost = callbacks.loss_signal();
        assert!(!*lost.borrow());

        // Clones share the flag
        callbacks.clone().disconnected(None);
        assert!(*lost.borrow());

        let (callbacks, _rx) = DeviceCallbacks::channel(2);
        let mut lost = callbacks.loss_signal();
        let waiter = tokio::spawn(async move { lost.wait_for(|lost| *lost).await.is_ok() });
        callbacks.error(5);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_late_device_is_closed() {
        let (callbacks, rx) = DeviceCallbacks::channel(1);
        drop(rx);
        assert!(callbacks.is_closed());

        let closed = Arc::new(AtomicBool::new(false));
        callbacks.opened(Box::new(FlagDevice {
            closed: closed.clone(),
        }));

        for _ in 0..50 {
            if closed.load(Ordering::SeqCst) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_capture_request_builder() {
        let request = CaptureRequest::new(CaptureTemplate::Preview)
            .add_target(Surface::new("preview", 1280, 720));
        assert_eq!(request.targets.len(), 1);
        assert_eq!(request.targets[0].id, "preview");
    }
}
