//! Loopback publish transport

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;

use livecast_core::{AudioConfig, PublishTransport, TransportError, VideoConfig};

/// How [`LoopbackTransport::connect`] behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    Succeed,
    Fail,
    /// Never complete; the connect future only ends when dropped
    Hang,
}

/// Publish transport that goes nowhere
///
/// Tracks encoder preparation and the streaming flag, and counts calls.
pub struct LoopbackTransport {
    behavior: Mutex<ConnectBehavior>,
    latency: Duration,
    fail_encoder: bool,
    streaming: AtomicBool,
    last_target: Mutex<Option<Url>>,
    audio_prepared: AtomicUsize,
    video_prepared: AtomicUsize,
    connects: AtomicUsize,
    stops: AtomicUsize,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            behavior: Mutex::new(ConnectBehavior::Succeed),
            latency: Duration::ZERO,
            fail_encoder: false,
            streaming: AtomicBool::new(false),
            last_target: Mutex::new(None),
            audio_prepared: AtomicUsize::new(0),
            video_prepared: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }

    pub fn with_connect_behavior(self, behavior: ConnectBehavior) -> Self {
        *self.behavior.lock() = behavior;
        self
    }

    /// Delay before a connect completes
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make video encoder preparation fail
    pub fn with_encoder_failure(mut self) -> Self {
        self.fail_encoder = true;
        self
    }

    pub fn set_connect_behavior(&self, behavior: ConnectBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn audio_prepared(&self) -> usize {
        self.audio_prepared.load(Ordering::SeqCst)
    }

    pub fn video_prepared(&self) -> usize {
        self.video_prepared.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Target of the most recent connect
    pub fn last_target(&self) -> Option<Url> {
        self.last_target.lock().clone()
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PublishTransport for LoopbackTransport {
    fn prepare_audio(&self, config: &AudioConfig) -> Result<(), TransportError> {
        if config.channels == 0 {
            return Err(TransportError::Encoder("audio needs at least one channel".to_string()));
        }
        self.audio_prepared.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn prepare_video(&self, config: &VideoConfig) -> Result<(), TransportError> {
        if self.fail_encoder {
            return Err(TransportError::Encoder(format!(
                "{} encoder unavailable",
                config.codec
            )));
        }
        self.video_prepared.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn connect(&self, target: &Url) -> Result<(), TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.last_target.lock() = Some(target.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let behavior = *self.behavior.lock();
        match behavior {
            ConnectBehavior::Succeed => {
                self.streaming.store(true, Ordering::SeqCst);
                tracing::debug!(target = %target, "Loopback stream started");
                Ok(())
            }
            ConnectBehavior::Fail => Err(TransportError::Connect(format!(
                "{} refused the connection",
                target
            ))),
            ConnectBehavior::Hang => std::future::pending().await,
        }
    }

    fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    async fn stop_stream(&self) -> Result<(), TransportError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.streaming.swap(false, Ordering::SeqCst) {
            tracing::debug!("Loopback stream stopped");
        }
        Ok(())
    }
}
