//! UDP discovery listener.
//!
//! Hosts broadcast a JSON beacon on port 5149 every few seconds.  The
//! listener binds that port, keeps a [`DeviceTable`] of the hosts it has heard
//! from, and reports hosts appearing and disappearing as [`DiscoveryEvent`]s.
//!
//! # Expiry (for beginners)
//!
//! UDP has no "goodbye" message: a host that is switched off simply stops
//! sending beacons.  The table therefore remembers when each host was last
//! heard from and drops it once it has been silent for longer than the
//! expiry window (30 seconds by default, six missed beacons).
//!
//! # Threading
//!
//! The listener runs on a dedicated thread named `clipsync-discovery` with a
//! blocking socket and a short read timeout, so it notices the `running` flag
//! being cleared within half a second.  Events reach async code through a
//! Tokio channel via `blocking_send`.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use clipsync_core::protocol::codec::decode_discovery;
use clipsync_core::protocol::messages::{DEFAULT_DISCOVERY_PORT, HOST_DEVICE_TYPE};
use clipsync_core::DiscoveryMessage;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Socket read timeout; bounds how long a stop request goes unnoticed.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Largest datagram accepted.  Beacons are well under 512 bytes.
const MAX_DATAGRAM: usize = 2048;

/// Error type for the discovery listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind discovery port {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to configure discovery socket: {0}")]
    Socket(#[source] std::io::Error),
    #[error("failed to spawn discovery thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Configuration for the discovery listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to bind; `0.0.0.0:5149` by default.
    pub bind_addr: SocketAddr,
    /// Only beacons with this `deviceType` are accepted.
    pub device_type: String,
    /// A host is dropped after this long without a beacon.
    pub expiry: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_DISCOVERY_PORT),
            device_type: HOST_DEVICE_TYPE.to_string(),
            expiry: Duration::from_secs(30),
        }
    }
}

/// A host heard on the discovery port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredHost {
    pub device_name: String,
    pub ip_address: IpAddr,
    /// The relay port advertised in the beacon.
    pub port: u16,
    pub last_seen: Instant,
}

impl DiscoveredHost {
    /// The TCP address of this host's relay.
    pub fn relay_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip_address, self.port)
    }
}

/// Events emitted by the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A new host was heard, or a known host now advertises a different
    /// name or port.
    Found(DiscoveredHost),
    /// A host has been silent for longer than the expiry window.
    Lost(DiscoveredHost),
}

// ── Device table ──────────────────────────────────────────────────────────────

/// Hosts currently considered present, keyed by IP address.
#[derive(Debug)]
pub struct DeviceTable {
    device_type: String,
    expiry: Duration,
    hosts: HashMap<IpAddr, DiscoveredHost>,
}

impl DeviceTable {
    pub fn new(device_type: impl Into<String>, expiry: Duration) -> Self {
        Self {
            device_type: device_type.into(),
            expiry,
            hosts: HashMap::new(),
        }
    }

    /// Records a beacon received from `source` at `now`.
    ///
    /// Returns the host when it is new or its name or port changed, and
    /// `None` for a plain refresh or a beacon of the wrong device type.
    ///
    /// The advertised `ipAddress` is used unless it is missing, unparsable,
    /// or a loopback address while the datagram came from elsewhere (a host
    /// that could not determine its LAN address advertises `127.0.0.1`).
    pub fn observe(
        &mut self,
        beacon: DiscoveryMessage,
        source: IpAddr,
        now: Instant,
    ) -> Option<DiscoveredHost> {
        if beacon.device_type != self.device_type {
            debug!(
                "ignoring beacon from {source} with device type {:?}",
                beacon.device_type
            );
            return None;
        }

        let ip_address = match beacon.ip_address.parse::<IpAddr>() {
            Ok(ip) if !(ip.is_loopback() && !source.is_loopback()) => ip,
            _ => source,
        };
        let host = DiscoveredHost {
            device_name: beacon.device_name,
            ip_address,
            port: beacon.port,
            last_seen: now,
        };

        let changed = match self.hosts.get(&ip_address) {
            Some(known) => known.port != host.port || known.device_name != host.device_name,
            None => true,
        };
        self.hosts.insert(ip_address, host.clone());
        changed.then_some(host)
    }

    /// Removes and returns every host not heard from within the expiry window.
    pub fn expire(&mut self, now: Instant) -> Vec<DiscoveredHost> {
        let expiry = self.expiry;
        let stale: Vec<IpAddr> = self
            .hosts
            .iter()
            .filter(|(_, host)| now.saturating_duration_since(host.last_seen) > expiry)
            .map(|(ip, _)| *ip)
            .collect();
        stale
            .into_iter()
            .filter_map(|ip| self.hosts.remove(&ip))
            .collect()
    }

    /// Current hosts, sorted by name then address.
    pub fn hosts(&self) -> Vec<DiscoveredHost> {
        let mut hosts: Vec<DiscoveredHost> = self.hosts.values().cloned().collect();
        hosts.sort_by(|a, b| {
            a.device_name
                .cmp(&b.device_name)
                .then(a.ip_address.cmp(&b.ip_address))
        });
        hosts
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

// ── Listener ──────────────────────────────────────────────────────────────────

/// Bound discovery socket, ready to be moved onto its thread.
pub struct DiscoveryListener {
    socket: UdpSocket,
    table: DeviceTable,
}

impl DiscoveryListener {
    /// Binds the discovery port.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Bind`] when the port is taken, typically by
    /// another ClipSync peer on the same machine.
    pub fn bind(config: ListenerConfig) -> Result<Self, ListenerError> {
        let socket = UdpSocket::bind(config.bind_addr).map_err(|source| ListenerError::Bind {
            addr: config.bind_addr,
            source,
        })?;
        socket
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(ListenerError::Socket)?;
        Ok(Self {
            socket,
            table: DeviceTable::new(config.device_type, config.expiry),
        })
    }

    /// The address actually bound (useful when binding port 0 in tests).
    ///
    /// # Errors
    ///
    /// Propagates the OS error from `getsockname`.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Moves the listener onto the `clipsync-discovery` thread.
    ///
    /// The thread exits when `running` is cleared or the receiver is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Spawn`] if the thread could not be created.
    pub fn spawn(
        self,
        running: Arc<AtomicBool>,
    ) -> Result<(mpsc::Receiver<DiscoveryEvent>, JoinHandle<()>), ListenerError> {
        let (tx, rx) = mpsc::channel(32);
        let handle = std::thread::Builder::new()
            .name("clipsync-discovery".to_string())
            .spawn(move || self.run(tx, running))
            .map_err(ListenerError::Spawn)?;
        Ok((rx, handle))
    }

    fn run(mut self, tx: mpsc::Sender<DiscoveryEvent>, running: Arc<AtomicBool>) {
        info!(
            "discovery listener on {}",
            self.socket
                .local_addr()
                .map_or_else(|_| "?".to_string(), |a| a.to_string())
        );
        let mut buf = [0u8; MAX_DATAGRAM];

        while running.load(Ordering::Relaxed) {
            let mut events = Vec::new();

            match self.socket.recv_from(&mut buf) {
                Ok((len, src)) => match decode_discovery(&buf[..len]) {
                    Ok(beacon) => {
                        if let Some(host) = self.table.observe(beacon, src.ip(), Instant::now()) {
                            info!(
                                "found host {:?} at {}",
                                host.device_name,
                                host.relay_addr()
                            );
                            events.push(DiscoveryEvent::Found(host));
                        }
                    }
                    Err(e) => debug!("ignoring datagram from {src}: {e}"),
                },
                Err(e) if is_timeout_error(&e) => {}
                Err(e) => warn!("discovery recv error: {e}"),
            }

            for host in self.table.expire(Instant::now()) {
                info!("lost host {:?} at {}", host.device_name, host.relay_addr());
                events.push(DiscoveryEvent::Lost(host));
            }

            for event in events {
                if tx.blocking_send(event).is_err() {
                    debug!("discovery receiver dropped; stopping listener");
                    return;
                }
            }
        }
        debug!("discovery listener stopped");
    }
}

/// Returns `true` for the error kinds a read timeout produces.
fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
