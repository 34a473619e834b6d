//! ClipSync host entry point.
//!
//! Loads the configuration, applies command-line overrides, picks a clipboard
//! backend and runs the sync service until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! clipsync-host [OPTIONS]
//!
//! Options:
//!   --config <PATH>            Config file [default: platform config dir]
//!   --port <PORT>              First relay port to try [default: 5150]
//!   --bind <IP>                Listener bind address [default: 0.0.0.0]
//!   --poll-interval-ms <MS>    Clipboard poll interval [default: 500]
//!   --device-name <NAME>       Name advertised to peers [default: host name]
//!   --no-discovery             Do not broadcast discovery beacons
//!   --forward-inbound          Relay updates from one peer to the others
//!   --log-level <FILTER>       Log filter when RUST_LOG is unset
//!   --write-config             Save the effective config and exit
//! ```
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config_from() + CLI overrides
//!  └─ ClipSyncService::start()
//!       ├─ BroadcastRelay       (Tokio tasks: accept loop, peer readers, forwarder)
//!       ├─ ChangeDetector       (clipsync-detector thread)
//!       └─ DiscoveryBeacon      (clipsync-beacon thread)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use clipsync_host::application::sync_clipboard::ClipboardAccess;
use clipsync_host::infrastructure::service::{ClipSyncService, ServiceConfig};
use clipsync_host::infrastructure::storage::config::{
    config_file_path, load_config_from, save_config_to, AppConfig,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// ClipSync desktop host.
///
/// Shares this machine's clipboard with phones and other desktops on the LAN.
#[derive(Debug, Parser)]
#[command(
    name = "clipsync-host",
    about = "LAN clipboard relay: detects local copies and shares them with connected peers",
    version
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "CLIPSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// First TCP port to try; the next 19 are probed if it is taken.
    #[arg(long, env = "CLIPSYNC_PORT")]
    port: Option<u16>,

    /// IP address to bind the relay to.
    #[arg(long, env = "CLIPSYNC_BIND")]
    bind: Option<String>,

    /// Clipboard poll interval in milliseconds.
    #[arg(long, env = "CLIPSYNC_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    /// Device name advertised in discovery beacons.
    #[arg(long, env = "CLIPSYNC_DEVICE_NAME")]
    device_name: Option<String>,

    /// Do not broadcast discovery beacons.
    #[arg(long)]
    no_discovery: bool,

    /// Re-broadcast updates received from one peer to all other peers.
    #[arg(long)]
    forward_inbound: bool,

    /// `tracing` filter used when `RUST_LOG` is not set.
    #[arg(long, env = "CLIPSYNC_LOG")]
    log_level: Option<String>,

    /// Write the effective configuration to the config file and exit.
    #[arg(long)]
    write_config: bool,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration.
    fn apply_to(&self, config: &mut AppConfig) {
        if let Some(port) = self.port {
            config.relay.base_port = port;
        }
        if let Some(bind) = &self.bind {
            config.relay.bind_address = bind.clone();
        }
        if let Some(ms) = self.poll_interval_ms {
            config.detector.poll_interval_ms = ms;
        }
        if let Some(name) = &self.device_name {
            config.discovery.device_name = Some(name.clone());
        }
        if self.no_discovery {
            config.discovery.enabled = false;
        }
        if self.forward_inbound {
            config.relay.forward_inbound = true;
        }
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
    }
}

// ── Clipboard backend ─────────────────────────────────────────────────────────

#[cfg(feature = "system-clipboard")]
fn open_clipboard() -> anyhow::Result<Arc<dyn ClipboardAccess>> {
    use clipsync_host::infrastructure::clipboard::system::SystemClipboard;
    let clipboard = SystemClipboard::new().context("failed to open the system clipboard")?;
    info!("using the system clipboard");
    Ok(Arc::new(clipboard))
}

#[cfg(not(feature = "system-clipboard"))]
fn open_clipboard() -> anyhow::Result<Arc<dyn ClipboardAccess>> {
    use clipsync_host::infrastructure::clipboard::memory::InMemoryClipboard;
    tracing::warn!(
        "built without the `system-clipboard` feature; using an in-memory clipboard"
    );
    Ok(Arc::new(InMemoryClipboard::new()))
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let path = match &cli.config {
        Some(path) => path.clone(),
        None => config_file_path().context("no config path given and no platform config dir")?,
    };
    let mut config = load_config_from(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    cli.apply_to(&mut config);

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
        )
        .init();

    if cli.write_config {
        save_config_to(&config, &path)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        info!("configuration written to {}", path.display());
        return Ok(());
    }

    let service_config =
        ServiceConfig::from_app_config(&config).context("invalid configuration")?;
    let service = ClipSyncService::new(service_config, open_clipboard()?);

    info!("ClipSync host starting (config: {})", path.display());
    service.start().await.context("failed to start ClipSync")?;

    let status = service.status();
    info!(
        "ready: peers can connect to {}:{}.  Press Ctrl-C to exit.",
        status.local_ip,
        status.listen_port.unwrap_or_default()
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutdown signal received");

    service.stop().await;
    info!("ClipSync host stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "system-clipboard"))]
    #[test]
    fn test_headless_build_falls_back_to_memory_clipboard() {
        let clipboard = open_clipboard().unwrap();
        assert_eq!(clipboard.get_text().unwrap(), None);
    }

    #[test]
    fn test_cli_without_flags_leaves_config_untouched() {
        // Arrange
        let cli = Cli::parse_from(["clipsync-host"]);
        let mut config = AppConfig::default();

        // Act
        cli.apply_to(&mut config);

        // Assert
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_cli_flags_override_config() {
        // Arrange
        let cli = Cli::parse_from([
            "clipsync-host",
            "--port",
            "6000",
            "--no-discovery",
            "--forward-inbound",
            "--device-name",
            "desk",
        ]);
        let mut config = AppConfig::default();

        // Act
        cli.apply_to(&mut config);

        // Assert
        assert_eq!(config.relay.base_port, 6000);
        assert!(!config.discovery.enabled);
        assert!(config.relay.forward_inbound);
        assert_eq!(config.discovery.device_name.as_deref(), Some("desk"));
    }
}
