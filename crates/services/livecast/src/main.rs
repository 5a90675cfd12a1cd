//! Livecast command-line host
//!
//! Runs one streaming session against the simulated camera until Ctrl-C,
//! SIGTERM, an optional deadline, or the session ending on its own. The
//! host teardown hook always runs before exit.
//!
//! # Usage
//!
//! ```bash
//! # Publish to a local RTMP server for 30 seconds
//! cargo run -p livecast -- --target rtmp://localhost:1935/live/stream --duration 30
//!
//! # No network: loopback transport, events as JSON lines
//! cargo run -p livecast -- --transport loopback --json
//!
//! # Exercise the permission prompt
//! cargo run -p livecast -- --permission prompt-deny
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use livecast_core::{
    Config, PermissionAuthority, PublishTransport, SessionEvent, SessionState,
    StreamSessionController, Surface,
};
use livecast_publish_rtmp::RtmpPublishTransport;
use livecast_sim::{LoopbackTransport, ScriptedPermissionAuthority, SimulatedCameraProvider};

/// Livecast streaming session host
///
/// Drives the capture-to-publish session controller from the command line.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file (falls back to LIVECAST_* variables)
    #[arg(short, long, env = "LIVECAST_CONFIG")]
    config: Option<PathBuf>,

    /// Publish target, overriding the configuration
    #[arg(short, long)]
    target: Option<String>,

    /// Publish transport
    #[arg(long, value_enum, default_value = "rtmp", env = "LIVECAST_TRANSPORT")]
    transport: TransportKind,

    /// How the camera permission is answered
    #[arg(long, value_enum, default_value = "granted", env = "LIVECAST_PERMISSION")]
    permission: PermissionMode,

    /// Capture device id, overriding the configuration
    #[arg(long)]
    device: Option<String>,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<u64>,

    /// Print session events as JSON lines on stdout
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Emit logs as JSON
    #[arg(long, default_value_t = false, env = "LIVECAST_LOG_JSON")]
    log_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum TransportKind {
    /// Plain TCP connection to an rtmp:// or rtmps:// endpoint (no TLS)
    Rtmp,
    /// Goes nowhere
    Loopback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum PermissionMode {
    /// Already granted, no prompt
    Granted,
    /// Prompt, user grants
    PromptGrant,
    /// Prompt, user denies
    PromptDeny,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = build_config(&args)?;
    run(args, config).await
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Load the configuration and apply command-line overrides
fn build_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(args.config.as_deref())
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;

    if let Some(target) = &args.target {
        config.publish.target = target.clone();
    }
    if let Some(device) = &args.device {
        config.device.device_id = Some(device.clone());
    }

    Ok(config)
}

fn build_permissions(mode: PermissionMode) -> Arc<dyn PermissionAuthority> {
    Arc::new(match mode {
        PermissionMode::Granted => ScriptedPermissionAuthority::granted(),
        PermissionMode::PromptGrant => ScriptedPermissionAuthority::answering(true),
        PermissionMode::PromptDeny => ScriptedPermissionAuthority::answering(false),
    })
}

fn build_transport(kind: TransportKind) -> Arc<dyn PublishTransport> {
    match kind {
        TransportKind::Rtmp => Arc::new(RtmpPublishTransport::new()),
        TransportKind::Loopback => Arc::new(LoopbackTransport::new()),
    }
}

async fn run(args: Args, config: Config) -> Result<()> {
    let target = config.publish.target.clone();
    tracing::info!(
        target = %target,
        transport = ?args.transport,
        permission = ?args.permission,
        "Starting Livecast"
    );

    let surface = Surface::new("preview", config.video.width, config.video.height);
    let controller = StreamSessionController::new(
        config,
        Arc::new(SimulatedCameraProvider::new()),
        build_permissions(args.permission),
        build_transport(args.transport),
    );
    controller.attach_surface(surface).await;

    let printer = tokio::spawn(print_events(controller.subscribe(), args.json));

    if let Err(e) = controller.request_start(&target).await {
        controller.on_host_teardown().await;
        printer.abort();
        return Err(e).context("Session did not start");
    }

    let mut state_rx = controller.subscribe_state();
    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received, tearing down session...");
        }
        _ = deadline => {
            tracing::info!("Duration elapsed, tearing down session...");
        }
        _ = state_rx.wait_for(|s| s.is_terminal()) => {
            tracing::info!("Session ended");
        }
    }

    controller.on_host_teardown().await;

    let snapshot = controller.snapshot().await;
    // Let the printer drain the teardown events
    tokio::task::yield_now().await;
    printer.abort();

    tracing::info!(
        generation = snapshot.generation,
        state = %snapshot.state,
        "Livecast shutdown complete"
    );

    match snapshot.last_error {
        Some(kind) => Err(anyhow::anyhow!("Session failed: {}", kind)),
        None => Ok(()),
    }
}

async fn print_events(mut events: broadcast::Receiver<SessionEvent>, json: bool) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if json {
                    match serde_json::to_string(&event) {
                        Ok(line) => println!("{}", line),
                        Err(e) => tracing::warn!("Failed to encode event: {}", e),
                    }
                } else {
                    log_event(&event);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::StateChanged {
            generation, from, to, ..
        } => {
            if *to == SessionState::Publishing {
                tracing::info!(generation, "Live");
            } else {
                tracing::debug!(generation, from = %from, to = %to, "State changed");
            }
        }
        SessionEvent::Error {
            generation, kind, ..
        } => {
            tracing::error!(generation, error = %kind, "Session error");
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["livecast"]).unwrap();
        assert_eq!(args.transport, TransportKind::Rtmp);
        assert_eq!(args.permission, PermissionMode::Granted);
        assert!(!args.json);
        assert!(args.duration.is_none());
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::try_parse_from([
            "livecast",
            "--transport",
            "loopback",
            "--permission",
            "prompt-deny",
            "--target",
            "rtmp://example.com/live/key",
            "--device",
            "sim-front",
            "--duration",
            "5",
            "--json",
        ])
        .unwrap();

        assert_eq!(args.transport, TransportKind::Loopback);
        assert_eq!(args.permission, PermissionMode::PromptDeny);
        assert_eq!(args.duration, Some(5));
        assert!(args.json);

        let config = build_config(&args).unwrap();
        assert_eq!(config.publish.target, "rtmp://example.com/live/key");
        assert_eq!(config.device.device_id.as_deref(), Some("sim-front"));
    }

    #[test]
    fn test_config_file_with_cli_target() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[publish]
target = "rtmp://from-file/live/key"

[video]
width = 640
height = 360
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let args = Args::try_parse_from(["livecast", "--config", &path]).unwrap();
        let config = build_config(&args).unwrap();
        assert_eq!(config.publish.target, "rtmp://from-file/live/key");
        assert_eq!(config.video.width, 640);

        let args = Args::try_parse_from([
            "livecast",
            "--config",
            &path,
            "--target",
            "rtmps://override/live/key",
        ])
        .unwrap();
        let config = build_config(&args).unwrap();
        assert_eq!(config.publish.target, "rtmps://override/live/key");
    }

    #[test]
    fn test_invalid_config_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[publish\ntarget = ").unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let args = Args::try_parse_from(["livecast", "--config", &path]).unwrap();
        assert!(build_config(&args).is_err());
    }

    #[tokio::test]
    async fn test_loopback_session_runs_to_deadline() {
        let args = Args::try_parse_from([
            "livecast",
            "--transport",
            "loopback",
            "--duration",
            "0",
        ])
        .unwrap();
        let config = Config::default();

        run(args, config).await.unwrap();
    }

    #[tokio::test]
    async fn test_denied_session_reports_failure() {
        let args = Args::try_parse_from([
            "livecast",
            "--transport",
            "loopback",
            "--permission",
            "prompt-deny",
            "--duration",
            "5",
        ])
        .unwrap();

        let err = run(args, Config::default()).await.unwrap_err();
        assert!(err.to_string().contains("camera permission denied"));
    }
}
