//! RTMP publish transport for Livecast
//!
//! Implements [`PublishTransport`] for `rtmp://` and `rtmps://` endpoints.
//! Encoder parameters are validated and held for the stream; `connect`
//! resolves the endpoint and opens the TCP connection the stream is
//! carried on. Deadlines are applied by the controller.
//!
//! Only the transport lifecycle is modelled. There is no RTMP handshake and
//! no media is sent. `rtmps://` selects port 443 but the connection is
//! plain TCP without TLS.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use livecast_publish_rtmp::RtmpPublishTransport;
//!
//! let transport = Arc::new(RtmpPublishTransport::new());
//! let controller = StreamSessionController::new(config, devices, permissions, transport);
//! controller.request_start("rtmp://localhost:1935/live/stream").await?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use url::Url;

use livecast_core::{AudioConfig, PublishTransport, TransportError, VideoConfig};

mod endpoint;

pub use endpoint::{
    EndpointError, RtmpEndpoint, RtmpScheme, RTMPS_DEFAULT_PORT, RTMP_DEFAULT_PORT,
};

/// Highest frame rate the encoder accepts
const MAX_FPS: u32 = 120;

/// Publish transport for RTMP/RTMPS endpoints
pub struct RtmpPublishTransport {
    /// Audio encoder settings (None if audio is not sent)
    audio: Mutex<Option<AudioConfig>>,

    /// Video encoder settings (None until prepared)
    video: Mutex<Option<VideoConfig>>,

    /// Open connection to the endpoint
    connection: tokio::sync::Mutex<Option<(RtmpEndpoint, TcpStream)>>,

    streaming: AtomicBool,
}

impl RtmpPublishTransport {
    pub fn new() -> Self {
        Self {
            audio: Mutex::new(None),
            video: Mutex::new(None),
            connection: tokio::sync::Mutex::new(None),
            streaming: AtomicBool::new(false),
        }
    }

    /// Audio settings the stream will carry
    pub fn audio_config(&self) -> Option<AudioConfig> {
        self.audio.lock().clone()
    }

    /// Video settings the stream will carry
    pub fn video_config(&self) -> Option<VideoConfig> {
        self.video.lock().clone()
    }

    /// Endpoint of the open connection
    pub async fn endpoint(&self) -> Option<RtmpEndpoint> {
        self.connection
            .lock()
            .await
            .as_ref()
            .map(|(endpoint, _)| endpoint.clone())
    }
}

impl Default for RtmpPublishTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PublishTransport for RtmpPublishTransport {
    fn prepare_audio(&self, config: &AudioConfig) -> Result<(), TransportError> {
        if config.sample_rate == 0 {
            return Err(TransportError::Encoder("audio sample rate is zero".to_string()));
        }
        if !(1..=2).contains(&config.channels) {
            return Err(TransportError::Encoder(format!(
                "unsupported audio channel count {}",
                config.channels
            )));
        }
        if config.bitrate == 0 {
            return Err(TransportError::Encoder("audio bitrate is zero".to_string()));
        }

        tracing::debug!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            bitrate = config.bitrate,
            "Audio encoder prepared"
        );
        *self.audio.lock() = Some(config.clone());
        Ok(())
    }

    fn prepare_video(&self, config: &VideoConfig) -> Result<(), TransportError> {
        if config.width == 0 || config.height == 0 {
            return Err(TransportError::Encoder(format!(
                "invalid video size {}x{}",
                config.width, config.height
            )));
        }
        if config.width % 2 != 0 || config.height % 2 != 0 {
            return Err(TransportError::Encoder(format!(
                "video size {}x{} must be even",
                config.width, config.height
            )));
        }
        if config.fps == 0 || config.fps > MAX_FPS {
            return Err(TransportError::Encoder(format!(
                "unsupported frame rate {}",
                config.fps
            )));
        }
        if config.bitrate == 0 {
            return Err(TransportError::Encoder("video bitrate is zero".to_string()));
        }

        tracing::debug!(
            width = config.width,
            height = config.height,
            fps = config.fps,
            bitrate = config.bitrate,
            codec = %config.codec,
            "Video encoder prepared"
        );
        *self.video.lock() = Some(config.clone());
        Ok(())
    }

    async fn connect(&self, target: &Url) -> Result<(), TransportError> {
        let endpoint = RtmpEndpoint::parse(target)
            .map_err(|e| TransportError::UnsupportedTarget(e.to_string()))?;

        if self.video.lock().is_none() {
            return Err(TransportError::Encoder("video encoder not prepared".to_string()));
        }

        if self.connection.lock().await.is_some() {
            return Err(already_connected());
        }

        // Not held across the network connect
        tracing::info!(endpoint = %endpoint.redacted(), "Connecting to RTMP endpoint");
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| TransportError::Connect(format!("{}: {}", endpoint.redacted(), e)))?;
        stream.set_nodelay(true)?;

        let mut connection = self.connection.lock().await;
        if connection.is_some() {
            return Err(already_connected());
        }
        tracing::info!(endpoint = %endpoint.redacted(), "RTMP connection established");
        *connection = Some((endpoint, stream));
        self.streaming.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    async fn stop_stream(&self) -> Result<(), TransportError> {
        self.streaming.store(false, Ordering::SeqCst);

        let connection = self.connection.lock().await.take();
        if let Some((endpoint, mut stream)) = connection {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!(endpoint = %endpoint.redacted(), "RTMP shutdown error: {}", e);
            }
            tracing::info!(endpoint = %endpoint.redacted(), "RTMP stream stopped");
        }
        Ok(())
    }
}

fn already_connected() -> TransportError {
    TransportError::Connect("already connected. Call stop_stream() first.".to_string())
}
