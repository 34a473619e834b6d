//! ClipSync peer entry point.
//!
//! Finds a host (by address or by listening for discovery beacons), connects
//! to its relay and prints every clipboard change it receives.  Images are
//! written to `--image-dir` when one is given.
//!
//! # Usage
//!
//! ```text
//! clipsync-peer [OPTIONS]
//!
//! Options:
//!   --host <IP>                    Relay address; skips discovery
//!   --port <PORT>                  Relay port used with --host [default: 5150]
//!   --discovery-port <PORT>        UDP port for beacons [default: 5149]
//!   --discover-timeout-secs <S>    Give up discovery after this long [default: 15]
//!   --send <TEXT>                  Send TEXT to the host after connecting
//!   --image-dir <DIR>              Save received images here
//!   --no-reconnect                 Exit when the connection drops
//!   --log-level <FILTER>           Log filter when RUST_LOG is unset [default: info]
//! ```
//!
//! # Event loop (for beginners)
//!
//! The `while let Some(event) = rx.recv().await` loop handles one
//! [`PeerEvent`] at a time:
//!
//! - `Connected` – send the `--send` text, if any (only on the first connect).
//! - `Update` – print text, or save the image.
//! - `Disconnected` – the client reconnects on its own unless
//!   `--no-reconnect` was given.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use clipsync_core::protocol::messages::{DEFAULT_DISCOVERY_PORT, DEFAULT_RELAY_PORT};
use clipsync_core::{ClipboardContent, ClipboardUpdate};
use clipsync_peer::infrastructure::discovery::{
    DiscoveryEvent, DiscoveryListener, ListenerConfig,
};
use clipsync_peer::infrastructure::image_store::ImageStore;
use clipsync_peer::infrastructure::network::{PeerClient, PeerConfig, PeerEvent};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// ClipSync peer.
#[derive(Debug, Parser)]
#[command(
    name = "clipsync-peer",
    about = "Connects to a ClipSync host and mirrors its clipboard to the terminal",
    version
)]
struct Cli {
    /// IP address of the host.  Without it the first discovered host is used.
    #[arg(long, env = "CLIPSYNC_HOST")]
    host: Option<IpAddr>,

    /// Relay port used together with `--host`.
    #[arg(long, env = "CLIPSYNC_PORT", default_value_t = DEFAULT_RELAY_PORT)]
    port: u16,

    /// UDP port the host broadcasts beacons to.
    #[arg(long, default_value_t = DEFAULT_DISCOVERY_PORT)]
    discovery_port: u16,

    /// How long to wait for a beacon before giving up.
    #[arg(long, default_value_t = 15)]
    discover_timeout_secs: u64,

    /// Text to put on the host clipboard once connected.
    #[arg(long)]
    send: Option<String>,

    /// Directory where received images are saved.
    #[arg(long, env = "CLIPSYNC_IMAGE_DIR")]
    image_dir: Option<PathBuf>,

    /// Exit when the connection drops instead of reconnecting.
    #[arg(long)]
    no_reconnect: bool,

    /// `tracing` filter used when `RUST_LOG` is not set.
    #[arg(long, env = "CLIPSYNC_LOG", default_value = "info")]
    log_level: String,
}

impl Cli {
    fn peer_config(&self, relay_addr: SocketAddr) -> PeerConfig {
        PeerConfig {
            relay_addr,
            reconnect_interval: if self.no_reconnect {
                None
            } else {
                Some(Duration::from_secs(5))
            },
            ..PeerConfig::default()
        }
    }
}

// ── Host resolution ───────────────────────────────────────────────────────────

/// Waits for the first beacon from a host and returns its relay address.
async fn discover_host(cli: &Cli, running: &Arc<AtomicBool>) -> anyhow::Result<SocketAddr> {
    let listener = DiscoveryListener::bind(ListenerConfig {
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), cli.discovery_port),
        ..ListenerConfig::default()
    })?;

    // The listener gets its own flag so it stops once a host is chosen.
    let listening = Arc::new(AtomicBool::new(true));
    let (mut rx, handle) = listener.spawn(Arc::clone(&listening))?;
    info!("waiting up to {}s for a host beacon", cli.discover_timeout_secs);

    let wait = Duration::from_secs(cli.discover_timeout_secs);
    let found = tokio::time::timeout(wait, async {
        while let Some(event) = rx.recv().await {
            if let DiscoveryEvent::Found(host) = event {
                return Some(host);
            }
        }
        None
    })
    .await;

    listening.store(false, Ordering::Relaxed);
    drop(rx);
    if tokio::task::spawn_blocking(move || handle.join()).await.is_err() {
        warn!("discovery thread did not shut down cleanly");
    }

    if !running.load(Ordering::Relaxed) {
        bail!("interrupted during discovery");
    }
    match found {
        Ok(Some(host)) => {
            info!("using host {:?} at {}", host.device_name, host.relay_addr());
            Ok(host.relay_addr())
        }
        _ => bail!("no host found within {}s; pass --host", cli.discover_timeout_secs),
    }
}

// ── Update handling ───────────────────────────────────────────────────────────

fn handle_update(update: ClipboardUpdate, images: Option<&ImageStore>) {
    let captured_at_ms = update.captured_at_ms();
    match update.into_content() {
        ClipboardContent::Text(text) => println!("{text}"),
        ClipboardContent::Image(png) => match images {
            Some(store) => {
                if let Err(e) = store.save(&png, captured_at_ms) {
                    warn!("failed to save image to {}: {e}", store.dir().display());
                }
            }
            None => info!("received a {} byte image; pass --image-dir to keep it", png.len()),
        },
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                running.store(false, Ordering::Relaxed);
            }
        });
    }

    let relay_addr = match cli.host {
        Some(ip) => SocketAddr::new(ip, cli.port),
        None => discover_host(&cli, &running)
            .await
            .context("host discovery failed")?,
    };

    let images = cli.image_dir.clone().map(ImageStore::new);
    let client = Arc::new(PeerClient::new(cli.peer_config(relay_addr)));
    let mut rx = Arc::clone(&client).start(Arc::clone(&running)).await;
    let mut pending_send = cli.send.clone();

    while let Some(event) = rx.recv().await {
        match event {
            PeerEvent::Connected { relay_addr } => {
                info!("connected to {relay_addr}");
                if let Some(text) = pending_send.take() {
                    client
                        .send_text(&text)
                        .await
                        .context("failed to send text to the host")?;
                    info!("sent {} characters to the host", text.chars().count());
                }
            }
            PeerEvent::Update(update) => handle_update(update, images.as_ref()),
            PeerEvent::Disconnected => info!("not connected"),
        }
        if !running.load(Ordering::Relaxed) {
            break;
        }
    }

    client.disconnect().await;
    info!("ClipSync peer stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
