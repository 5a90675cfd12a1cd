//! Configuration for the session controller
//!
//! Configuration can be loaded from a TOML file and/or environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main controller configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Publish target and transport settings
    #[serde(default)]
    pub publish: PublishConfig,

    /// Video encoder parameters handed to the transport
    #[serde(default)]
    pub video: VideoConfig,

    /// Audio encoder parameters handed to the transport
    #[serde(default)]
    pub audio: AudioConfig,

    /// Capture device settings
    #[serde(default)]
    pub device: DeviceConfig,

    /// Event channel settings
    #[serde(default)]
    pub events: EventsConfig,
}

/// Publish target configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Default target used when the host does not supply one
    #[serde(default = "default_target")]
    pub target: String,

    /// URL schemes accepted as publish targets
    #[serde(default = "default_allowed_schemes")]
    pub allowed_schemes: Vec<String>,

    /// Transport connect deadline in milliseconds (0 disables it)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_target() -> String {
    "rtmp://localhost:1935/live/stream".to_string()
}

fn default_allowed_schemes() -> Vec<String> {
    vec!["rtmp".to_string(), "rtmps".to_string()]
}

fn default_connect_timeout() -> u64 {
    10_000
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            allowed_schemes: default_allowed_schemes(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl PublishConfig {
    /// Connect deadline, `None` when disabled
    pub fn connect_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.connect_timeout_ms)
    }
}

/// Video codec requested from the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    H265,
    Av1,
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoCodec::H264 => write!(f, "h264"),
            VideoCodec::H265 => write!(f, "h265"),
            VideoCodec::Av1 => write!(f, "av1"),
        }
    }
}

/// Video encoder parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoConfig {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Target bitrate in bits per second
    #[serde(default = "default_video_bitrate")]
    pub bitrate: u32,

    #[serde(default = "default_codec")]
    pub codec: VideoCodec,
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_fps() -> u32 {
    30
}

fn default_video_bitrate() -> u32 {
    2_500_000
}

fn default_codec() -> VideoCodec {
    VideoCodec::H264
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            bitrate: default_video_bitrate(),
            codec: default_codec(),
        }
    }
}

/// Audio encoder parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Publish an audio track at all
    #[serde(default = "default_audio_enabled")]
    pub enabled: bool,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_channels")]
    pub channels: u16,

    /// Target bitrate in bits per second
    #[serde(default = "default_audio_bitrate")]
    pub bitrate: u32,
}

fn default_audio_enabled() -> bool {
    true
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_channels() -> u16 {
    2
}

fn default_audio_bitrate() -> u32 {
    128_000
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: default_audio_enabled(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            bitrate: default_audio_bitrate(),
        }
    }
}

/// Capture device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device to open; the first listed device when unset
    #[serde(default)]
    pub device_id: Option<String>,

    /// Device open deadline in milliseconds (0 disables it)
    #[serde(default = "default_open_timeout")]
    pub open_timeout_ms: u64,

    /// How long host-side teardown waits for the background worker to exit
    #[serde(default = "default_worker_join_timeout")]
    pub worker_join_timeout_ms: u64,
}

fn default_open_timeout() -> u64 {
    10_000
}

fn default_worker_join_timeout() -> u64 {
    5_000
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            open_timeout_ms: default_open_timeout(),
            worker_join_timeout_ms: default_worker_join_timeout(),
        }
    }
}

impl DeviceConfig {
    /// Open deadline, `None` when disabled
    pub fn open_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.open_timeout_ms)
    }

    pub fn worker_join_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_join_timeout_ms)
    }
}

/// Event channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Broadcast buffer size; slow subscribers lag past this
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

fn default_event_capacity() -> usize {
    64
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Config::default();

        // Publish
        if let Ok(target) = std::env::var("LIVECAST_TARGET") {
            config.publish.target = target;
        }
        if let Ok(schemes) = std::env::var("LIVECAST_ALLOWED_SCHEMES") {
            config.publish.allowed_schemes = schemes
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(ms) = std::env::var("LIVECAST_CONNECT_TIMEOUT_MS") {
            if let Ok(v) = ms.parse() {
                config.publish.connect_timeout_ms = v;
            }
        }

        // Video
        if let Ok(w) = std::env::var("LIVECAST_VIDEO_WIDTH") {
            if let Ok(v) = w.parse() {
                config.video.width = v;
            }
        }
        if let Ok(h) = std::env::var("LIVECAST_VIDEO_HEIGHT") {
            if let Ok(v) = h.parse() {
                config.video.height = v;
            }
        }
        if let Ok(fps) = std::env::var("LIVECAST_VIDEO_FPS") {
            if let Ok(v) = fps.parse() {
                config.video.fps = v;
            }
        }
        if let Ok(bitrate) = std::env::var("LIVECAST_VIDEO_BITRATE") {
            if let Ok(v) = bitrate.parse() {
                config.video.bitrate = v;
            }
        }

        // Audio
        if let Ok(enabled) = std::env::var("LIVECAST_AUDIO_ENABLED") {
            if let Ok(v) = enabled.parse() {
                config.audio.enabled = v;
            }
        }

        // Device
        if let Ok(id) = std::env::var("LIVECAST_DEVICE_ID") {
            config.device.device_id = Some(id);
        }
        if let Ok(ms) = std::env::var("LIVECAST_OPEN_TIMEOUT_MS") {
            if let Ok(v) = ms.parse() {
                config.device.open_timeout_ms = v;
            }
        }

        config
    }

    /// Load configuration from file if it exists, otherwise from environment
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        if let Some(p) = path {
            if p.as_ref().exists() {
                return Self::from_file(p);
            }
        }
        Ok(Self::from_env())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.publish.target, "rtmp://localhost:1935/live/stream");
        assert_eq!(config.publish.allowed_schemes, vec!["rtmp", "rtmps"]);
        assert_eq!(config.video.width, 1280);
        assert_eq!(config.video.codec, VideoCodec::H264);
        assert!(config.audio.enabled);
        assert_eq!(config.device.open_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.events.capacity, 64);
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
[publish]
target = "rtmps://live.example.com/app/key"
connect_timeout_ms = 0

[video]
width = 1920
height = 1080
codec = "h265"

[device]
device_id = "back"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.publish.target, "rtmps://live.example.com/app/key");
        assert_eq!(config.publish.connect_timeout(), None);
        assert_eq!(config.video.width, 1920);
        assert_eq!(config.video.fps, 30);
        assert_eq!(config.video.codec, VideoCodec::H265);
        assert_eq!(config.device.device_id.as_deref(), Some("back"));
        assert_eq!(config.audio.sample_rate, 44_100);
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[audio]\nenabled = false\nchannels = 1").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(!config.audio.enabled);
        assert_eq!(config.audio.channels, 1);
    }

    #[test]
    fn test_config_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[video]\nwidth = \"wide\"").unwrap();

        let result = Config::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let config = Config::load(Some("/nonexistent/livecast.toml")).unwrap();
        assert!(!config.publish.allowed_schemes.is_empty());
    }
}
