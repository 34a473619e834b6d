//! UDP broadcast discovery beacon.
//!
//! While the relay is running the host broadcasts one small JSON datagram
//! every few seconds so peers on the LAN can find it without typing an IP:
//!
//! ```json
//! {"deviceType":"windows","deviceName":"DESKTOP-1","ipAddress":"192.168.1.20","port":5150,"timestamp":1700000000000}
//! ```
//!
//! `port` is the port the relay actually bound after probing, which is not
//! necessarily 5150.
//!
//! # How UDP broadcast works (for beginners)
//!
//! A datagram sent to `255.255.255.255` is delivered to every host on the
//! local network segment that has a socket bound to the destination port.
//! Nothing is acknowledged: if no peer is listening the datagram is simply
//! lost, which is fine because the next beacon follows a few seconds later.
//! Routers do not forward these broadcasts, so discovery never leaves the LAN.
//!
//! The sender socket must opt in with `SO_BROADCAST` (`set_broadcast(true)`),
//! otherwise the OS rejects sends to a broadcast address.
//!
//! # Threading
//!
//! The beacon runs on a dedicated thread named `clipsync-beacon` with plain
//! blocking `std::net::UdpSocket` calls.  Send failures (no network, interface
//! down) are logged and the loop tries again on the next tick.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use clipsync_core::protocol::codec::encode_discovery;
use clipsync_core::protocol::messages::{
    current_timestamp_ms, DEFAULT_DISCOVERY_PORT, HOST_DEVICE_TYPE,
};
use clipsync_core::{DiscoveryMessage, ProtocolError};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Sleep slice used to notice a stop request between beacons.
const STOP_POLL: Duration = Duration::from_millis(250);

/// Error type for the discovery beacon.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP socket could not be created or configured.
    #[error("failed to open beacon socket: {0}")]
    Socket(#[source] std::io::Error),
    /// A beacon datagram could not be sent.
    #[error("failed to send beacon to {target}: {source}")]
    Send {
        target: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// The beacon could not be serialized.
    #[error(transparent)]
    Encode(#[from] ProtocolError),
    /// The beacon thread could not be started.
    #[error("failed to spawn beacon thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Configuration for the discovery beacon.
#[derive(Debug, Clone)]
pub struct BeaconConfig {
    /// Where datagrams are sent.  Defaults to `255.255.255.255:5149`.
    pub target: SocketAddr,
    /// Time between two beacons.
    pub interval: Duration,
    /// Value of `deviceType`.
    pub device_type: String,
    /// Value of `deviceName`; the machine's host name when `None`.
    pub device_name: Option<String>,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            target: SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), DEFAULT_DISCOVERY_PORT),
            interval: Duration::from_secs(5),
            device_type: HOST_DEVICE_TYPE.to_string(),
            device_name: None,
        }
    }
}

/// Periodic UDP broadcaster advertising the relay's address.
pub struct DiscoveryBeacon {
    config: BeaconConfig,
    socket: UdpSocket,
}

impl DiscoveryBeacon {
    /// Opens a broadcast-enabled UDP socket on an ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Socket`] if the socket cannot be bound or
    /// broadcast cannot be enabled.
    pub fn bind(config: BeaconConfig) -> Result<Self, DiscoveryError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(DiscoveryError::Socket)?;
        socket.set_broadcast(true).map_err(DiscoveryError::Socket)?;
        Ok(Self { config, socket })
    }

    /// Builds the datagram advertising `relay_port`.
    pub fn build_message(&self, relay_port: u16) -> DiscoveryMessage {
        DiscoveryMessage {
            device_type: self.config.device_type.clone(),
            device_name: self
                .config
                .device_name
                .clone()
                .unwrap_or_else(host_name),
            ip_address: local_ip_string(),
            port: relay_port,
            timestamp: current_timestamp_ms(),
        }
    }

    /// Sends a single beacon advertising `relay_port`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Send`] if the OS rejects the datagram.
    pub fn send_once(&self, relay_port: u16) -> Result<(), DiscoveryError> {
        let datagram = encode_discovery(&self.build_message(relay_port))?;
        self.socket
            .send_to(&datagram, self.config.target)
            .map_err(|source| DiscoveryError::Send {
                target: self.config.target,
                source,
            })?;
        Ok(())
    }

    /// Starts the beacon thread.  It runs until `running` is cleared.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Spawn`] if the thread cannot be created.
    pub fn spawn(
        self,
        relay_port: u16,
        running: Arc<AtomicBool>,
    ) -> Result<JoinHandle<()>, DiscoveryError> {
        std::thread::Builder::new()
            .name("clipsync-beacon".to_string())
            .spawn(move || self.run(relay_port, running))
            .map_err(DiscoveryError::Spawn)
    }

    fn run(self, relay_port: u16, running: Arc<AtomicBool>) {
        info!(
            "discovery beacon advertising port {relay_port} to {} every {:?}",
            self.config.target, self.config.interval
        );

        while running.load(Ordering::Relaxed) {
            match self.send_once(relay_port) {
                Ok(()) => debug!("beacon sent"),
                Err(e) => warn!("{e}"),
            }

            let next = Instant::now() + self.config.interval;
            while running.load(Ordering::Relaxed) && Instant::now() < next {
                std::thread::sleep(STOP_POLL.min(next.saturating_duration_since(Instant::now())));
            }
        }

        info!("discovery beacon stopped");
    }
}

/// The machine's host name, as shown to peers.
pub fn host_name() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

/// The LAN address peers should connect to, or `127.0.0.1` when no
/// non-loopback interface is up.
pub fn local_ip_string() -> String {
    match local_ip_address::local_ip() {
        Ok(ip) => ip.to_string(),
        Err(e) => {
            debug!("local IP lookup failed: {e}");
            Ipv4Addr::LOCALHOST.to_string()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
