//! CamLink recorder entry point.
//!
//! Records one device until Ctrl+C, reconnecting across short outages.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config() + CLI overrides -> RecorderSettings
//!  └─ DirectoryFrameStore::create()  -- recordings/session_<uuid>/
//!  └─ Recorder::start_recording()    -- resolve, connect, spawn receive pump
//!  └─ select loop
//!       ├─ Ctrl+C                     -> stop_recording(), exit 0
//!       ├─ RecordingStopped event     -> exit (non-zero if exhausted)
//!       └─ status tick                -> log fps / attempts / telemetry
//! ```
//!
//! # Settings precedence (for beginners)
//!
//! Built-in defaults < config file < `CAMLINK_*` environment variables <
//! command-line flags.  clap handles the last two: every flag has an `env`
//! fallback, and a flag that is absent from both leaves the config file
//! value untouched.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use camlink_core::DeviceKind;
use camlink_recorder::application::{
    EventSink, Recorder, RecorderError, RecorderEvent, StopReason, TracingEventSink,
};
use camlink_recorder::infrastructure::config::{self, ConfigError, RecorderConfig};
use camlink_recorder::infrastructure::frame_store::DirectoryFrameStore;
use camlink_recorder::infrastructure::transport::WsConnector;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// CamLink recorder.
///
/// Connects to a camera device over WebSocket, writes every frame to disk,
/// and reconnects automatically when the stream drops.
#[derive(Debug, Parser)]
#[command(
    name = "camlink-recorder",
    about = "Records a camera WebSocket stream, reconnecting across outages",
    version
)]
struct Cli {
    /// Device address: an IP, a hostname, or a full http/https/ws/wss URL.
    ///
    /// Falls back to `[device] address` in the config file.
    #[arg(long, short = 'a', env = "CAMLINK_ADDRESS")]
    address: Option<String>,

    /// Path to the TOML config file.  Defaults to the platform location.
    #[arg(long, env = "CAMLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Root directory for recording folders.
    #[arg(long, env = "CAMLINK_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Reconnect attempts before the recording is stopped.
    #[arg(long, env = "CAMLINK_MAX_ATTEMPTS")]
    max_attempts: Option<u32>,

    /// Seconds to wait before each reconnect attempt.
    #[arg(long, env = "CAMLINK_RETRY_DELAY")]
    retry_delay: Option<u64>,

    /// Handshake timeout per candidate URI, in milliseconds.
    #[arg(long, env = "CAMLINK_CONNECT_TIMEOUT_MS")]
    connect_timeout_ms: Option<u64>,

    /// Device kind (face, left_eye, right_eye); adds its mDNS fallback.
    #[arg(long, env = "CAMLINK_DEVICE_KIND")]
    device_kind: Option<DeviceKind>,

    /// Seconds between status log lines.  0 disables them.
    #[arg(long, default_value_t = 5, env = "CAMLINK_STATUS_INTERVAL")]
    status_interval: u64,
}

impl Cli {
    /// Layers the flags that were given over `config`.
    fn apply_to(&self, config: &mut RecorderConfig) {
        if let Some(address) = &self.address {
            config.device.address = Some(address.clone());
        }
        if let Some(kind) = self.device_kind {
            config.device.kind = kind;
        }
        if let Some(dir) = &self.output_dir {
            config.output.directory = dir.clone();
        }
        if let Some(max_attempts) = self.max_attempts {
            config.reconnect.max_attempts = max_attempts;
        }
        if let Some(retry_delay) = self.retry_delay {
            config.reconnect.retry_delay_secs = retry_delay;
        }
        if let Some(timeout) = self.connect_timeout_ms {
            config.connection.connect_timeout_ms = timeout;
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<RecorderConfig> {
    if let Some(path) = &cli.config {
        return config::load_config_from(path)
            .with_context(|| format!("loading {}", path.display()));
    }
    match config::load_config() {
        Ok(config) => Ok(config),
        Err(ConfigError::NoPlatformConfigDir) => {
            // e.g. HOME unset
            eprintln!("warning: {}; using default settings", ConfigError::NoPlatformConfigDir);
            Ok(RecorderConfig::default())
        }
        Err(e) => Err(e).context("loading the platform config file"),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;
    cli.apply_to(&mut config);

    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // `RUST_LOG` wins; otherwise the config file's level applies.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.output.log_level)),
        )
        .init();

    let address = config
        .device
        .address
        .clone()
        .context("no device address: pass --address or set [device] address in the config")?;
    let settings = config.settings();
    info!(
        %address,
        kind = %settings.device_kind,
        max_attempts = settings.policy.max_attempts,
        retry_delay = ?settings.policy.retry_delay,
        "CamLink recorder starting"
    );

    let store = Arc::new(
        DirectoryFrameStore::create(&config.output.directory).with_context(|| {
            format!("creating output folder under {}", config.output.directory.display())
        })?,
    );

    // RecordingStopped ends the process; everything else is only logged.
    let (stopped_tx, mut stopped_rx) = mpsc::unbounded_channel::<StopReason>();
    let events = move |event: &RecorderEvent| {
        TracingEventSink.on_event(event);
        if let RecorderEvent::RecordingStopped { reason, .. } = event {
            let _ = stopped_tx.send(reason.clone());
        }
    };

    let recorder = Recorder::new(settings, Arc::new(WsConnector), Arc::new(events), store.clone());
    recorder
        .start_recording(&address)
        .await
        .with_context(|| format!("could not start recording from '{address}'"))?;

    // ── Main loop ─────────────────────────────────────────────────────────────
    let mut status_tick = tokio::time::interval(Duration::from_secs(cli.status_interval.max(1)));
    status_tick.tick().await;

    let outcome = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("failed to listen for Ctrl+C: {e}");
                }
                info!("shutdown requested");
                if let Err(e) = recorder.stop_recording().await {
                    warn!("stop: {e}");
                }
                break Ok(());
            }
            reason = stopped_rx.recv() => {
                break match reason {
                    Some(StopReason::ReconnectExhausted { attempts }) => {
                        Err(RecorderError::ReconnectExhausted { attempts })
                    }
                    _ => Ok(()),
                };
            }
            _ = status_tick.tick(), if cli.status_interval > 0 => {
                let status = recorder.get_status();
                info!(
                    state = %status.state,
                    fps = status.fps,
                    frames = status.frames_received,
                    attempt = status.reconnect_attempt,
                    max_attempts = status.max_attempts,
                    telemetry = %status.telemetry.summary(),
                    "status"
                );
            }
        }
    };

    info!(
        dir = %store.dir().display(),
        written = store.frames_written(),
        failed = store.write_failures(),
        "CamLink recorder stopped"
    );
    outcome.map_err(Into::into)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn test_cli_defaults_leave_config_untouched() {
        // Arrange
        let cli = Cli::parse_from(["camlink-recorder"]);
        let mut config = RecorderConfig::default();

        // Act
        cli.apply_to(&mut config);

        // Assert
        assert_eq!(config, RecorderConfig::default());
        assert_eq!(cli.status_interval, 5);
    }

    #[test]
    fn test_cli_flags_override_config_file() {
        let cli = Cli::parse_from([
            "camlink-recorder",
            "--address",
            "192.168.22.215",
            "--max-attempts",
            "3",
            "--retry-delay",
            "2",
            "--connect-timeout-ms",
            "1500",
            "--device-kind",
            "left-eye",
        ]);
        let mut config = RecorderConfig::default();

        cli.apply_to(&mut config);
        let settings = config.settings();

        assert_eq!(config.device.address.as_deref(), Some("192.168.22.215"));
        assert_eq!(settings.policy.max_attempts, 3);
        assert_eq!(settings.policy.retry_delay, Duration::from_secs(2));
        assert_eq!(settings.connect_timeout, Duration::from_millis(1500));
        assert_eq!(settings.device_kind, DeviceKind::LeftEye);
    }

    #[test]
    fn test_cli_rejects_unknown_device_kind() {
        let result = Cli::try_parse_from(["camlink-recorder", "--device-kind", "tail"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_address_from_config_is_kept_without_flag() {
        let cli = Cli::parse_from(["camlink-recorder", "--output-dir", "/tmp/rec"]);
        let mut config = RecorderConfig::default();
        config.device.address = Some("cam.local".into());

        cli.apply_to(&mut config);

        assert_eq!(config.device.address.as_deref(), Some("cam.local"));
        assert_eq!(config.output.directory, PathBuf::from("/tmp/rec"));
    }

    #[test]
    fn test_explicit_config_path_that_does_not_exist_loads_defaults() {
        // Arrange
        let missing = std::env::temp_dir().join("camlink-no-such-dir/recorder.toml");
        let cli = Cli::parse_from([
            OsString::from("camlink-recorder"),
            OsString::from("--config"),
            missing.into_os_string(),
        ]);

        // Act
        let config = load_config(&cli).unwrap();

        // Assert
        assert_eq!(config, RecorderConfig::default());
    }
}
