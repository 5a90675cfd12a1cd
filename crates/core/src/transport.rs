//! Publish transport collaborator
//!
//! Encodes and ships the outbound stream. Only the session lifecycle
//! contract is modelled here; the wire protocol is the transport's concern.

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::config::{AudioConfig, VideoConfig};

/// Errors reported by a publish transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// Encoder rejected the audio or video parameters
    #[error("Encoder configuration error: {0}")]
    Encoder(String),

    /// Target could not be reached or refused the stream
    #[error("Connect error: {0}")]
    Connect(String),

    /// Target URL is not usable by this transport
    #[error("Unsupported target: {0}")]
    UnsupportedTarget(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound stream transport (encoder + network)
#[async_trait]
pub trait PublishTransport: Send + Sync {
    /// Configure the audio encoder
    fn prepare_audio(&self, config: &AudioConfig) -> Result<(), TransportError>;

    /// Configure the video encoder
    fn prepare_video(&self, config: &VideoConfig) -> Result<(), TransportError>;

    /// Connect to `target` and start streaming
    ///
    /// The future may be dropped mid-flight when the session is stopped;
    /// `stop_stream` is called afterwards either way.
    async fn connect(&self, target: &Url) -> Result<(), TransportError>;

    /// Check if the stream is currently going out
    fn is_streaming(&self) -> bool;

    /// Stop streaming; must be harmless when not streaming
    async fn stop_stream(&self) -> Result<(), TransportError>;
}
