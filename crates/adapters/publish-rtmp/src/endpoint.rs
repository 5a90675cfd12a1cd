//! RTMP endpoint parsing
//!
//! `rtmp[s]://host[:port]/app/stream-key`

use thiserror::Error;
use url::Url;

/// Default port for `rtmp://`
pub const RTMP_DEFAULT_PORT: u16 = 1935;

/// Default port for `rtmps://`
pub const RTMPS_DEFAULT_PORT: u16 = 443;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("unsupported scheme '{0}', expected rtmp or rtmps")]
    UnsupportedScheme(String),

    #[error("missing host")]
    MissingHost,

    #[error("missing application name in path")]
    MissingApp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtmpScheme {
    Rtmp,
    Rtmps,
}

impl RtmpScheme {
    pub fn default_port(&self) -> u16 {
        match self {
            RtmpScheme::Rtmp => RTMP_DEFAULT_PORT,
            RtmpScheme::Rtmps => RTMPS_DEFAULT_PORT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RtmpScheme::Rtmp => "rtmp",
            RtmpScheme::Rtmps => "rtmps",
        }
    }
}

/// A parsed publish endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtmpEndpoint {
    pub scheme: RtmpScheme,
    pub host: String,
    pub port: u16,
    pub app: String,
    /// Stream key; may be empty when the server assigns one
    pub stream_key: String,
}

impl RtmpEndpoint {
    pub fn parse(url: &Url) -> Result<Self, EndpointError> {
        let scheme = match url.scheme().to_ascii_lowercase().as_str() {
            "rtmp" => RtmpScheme::Rtmp,
            "rtmps" => RtmpScheme::Rtmps,
            other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or(EndpointError::MissingHost)?
            .to_string();
        let port = url.port().unwrap_or_else(|| scheme.default_port());

        let path = url.path().trim_start_matches('/');
        let (app, stream_key) = match path.split_once('/') {
            Some((app, key)) => (app, key),
            None => (path, ""),
        };
        if app.is_empty() {
            return Err(EndpointError::MissingApp);
        }

        Ok(Self {
            scheme,
            host,
            port,
            app: app.to_string(),
            stream_key: stream_key.to_string(),
        })
    }

    /// Endpoint with the stream key masked, for logs
    pub fn redacted(&self) -> String {
        let key = if self.stream_key.is_empty() { "" } else { "/****" };
        format!(
            "{}://{}:{}/{}{}",
            self.scheme.as_str(),
            self.host,
            self.port,
            self.app,
            key
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<RtmpEndpoint, EndpointError> {
        RtmpEndpoint::parse(&Url::parse(s).unwrap())
    }

    #[test]
    fn test_parse_full_endpoint() {
        let endpoint = parse("rtmp://live.example.com:1936/live/abc123").unwrap();
        assert_eq!(endpoint.scheme, RtmpScheme::Rtmp);
        assert_eq!(endpoint.host, "live.example.com");
        assert_eq!(endpoint.port, 1936);
        assert_eq!(endpoint.app, "live");
        assert_eq!(endpoint.stream_key, "abc123");
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(parse("rtmp://localhost/live/key").unwrap().port, 1935);
        assert_eq!(parse("rtmps://localhost/live/key").unwrap().port, 443);
    }

    #[test]
    fn test_key_with_slashes_and_no_key() {
        let endpoint = parse("rtmp://localhost/app/user/key").unwrap();
        assert_eq!(endpoint.app, "app");
        assert_eq!(endpoint.stream_key, "user/key");

        let endpoint = parse("rtmp://localhost/app").unwrap();
        assert_eq!(endpoint.stream_key, "");
    }

    #[test]
    fn test_invalid_endpoints() {
        assert_eq!(
            parse("srt://localhost/live"),
            Err(EndpointError::UnsupportedScheme("srt".to_string()))
        );
        assert_eq!(parse("rtmp://localhost"), Err(EndpointError::MissingApp));
        assert_eq!(parse("rtmp://localhost/"), Err(EndpointError::MissingApp));
    }

    #[test]
    fn test_redacted_hides_key() {
        let endpoint = parse("rtmp://localhost/live/secret").unwrap();
        assert_eq!(endpoint.redacted(), "rtmp://localhost:1935/live/****");
        assert!(!endpoint.redacted().contains("secret"));

        let endpoint = parse("rtmps://localhost/live").unwrap();
        assert_eq!(endpoint.redacted(), "rtmps://localhost:443/live");
    }
}
