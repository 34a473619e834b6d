//! BroadcastRelay: TCP listener that fans clipboard updates out to peers.
//!
//! # Tasks (for beginners)
//!
//! While the relay is `Running` these Tokio tasks are alive:
//!
//! ```text
//! accept loop ──spawn──► peer reader (one per connection)
//!      │                     │  decode line ─► ClipboardSync::apply_remote
//!      │                     └─ (forward_inbound) ─► registry.broadcast_except
//!      │
//! forwarder  ◄── mpsc ◄── ChangeDetector thread
//!      └─► encode_update ─► registry.broadcast
//! ```
//!
//! Every blocking wait (accept, read, the forwarder's `recv`) is wrapped in
//! `tokio::time::timeout`, and the relay's `running` flag is checked after
//! each timeout.  Clearing the flag therefore stops every task within about
//! two timeout periods.  The accept task owns the peer readers it spawns and
//! returns only after the listener is closed and every reader has finished,
//! so once `stop` has awaited it no peer can still be registered.
//!
//! # Port probing
//!
//! `start` tries `base_port`, `base_port + 1`, ... for `port_range` ports and
//! keeps the first one that binds.  The bound port is what the discovery
//! beacon advertises.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use std::time::Duration;

use clipsync_core::protocol::codec::message_to_update;
use clipsync_core::protocol::messages::{DEFAULT_PORT_RANGE, DEFAULT_RELAY_PORT};
use clipsync_core::{decode_line, encode_update, ClipboardUpdate, LineBuffer};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::relay_lifecycle::{LifecycleError, RelayPhase};
use crate::application::sync_clipboard::ClipboardSync;
use crate::infrastructure::network::connection_registry::{
    ConnectionRegistry, PeerConnection, PeerId, TcpPeerSink,
};

/// Size of each socket read.  Lines longer than this arrive over several reads.
const READ_CHUNK: usize = 64 * 1024;

/// Error type for relay operations.
#[derive(Debug, Error)]
pub enum RelayError {
    /// No port in the probe range could be bound.
    #[error("no free TCP port in {first}..={last} on {address}: {source}")]
    NoFreePort {
        address: IpAddr,
        first: u16,
        last: u16,
        #[source]
        source: io::Error,
    },
    /// The probe range is empty or runs past port 65535.
    #[error("invalid port range: {count} port(s) from {base}")]
    InvalidPortRange { base: u16, count: u16 },
    /// `start` was called while the relay was not stopped.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Configuration for the relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to bind the listener to.  `0.0.0.0` accepts peers on every interface.
    pub bind_address: IpAddr,
    /// First port tried.
    pub base_port: u16,
    /// Number of consecutive ports tried, including `base_port`.
    pub port_range: u16,
    /// Timeout for a single accept, read or write.
    pub io_timeout: Duration,
    /// Re-broadcast applied inbound updates to the other peers.
    pub forward_inbound: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            base_port: DEFAULT_RELAY_PORT,
            port_range: DEFAULT_PORT_RANGE,
            io_timeout: Duration::from_secs(1),
            forward_inbound: false,
        }
    }
}

/// Mutable run-time state, replaced on every start/stop cycle.
#[derive(Default)]
struct RelayRuntime {
    phase: RelayPhase,
    bound_port: Option<u16>,
    running: Option<Arc<AtomicBool>>,
    tasks: Vec<JoinHandle<()>>,
}

/// State shared by the accept loop and every peer reader.
struct PeerContext {
    sync: Arc<ClipboardSync>,
    registry: Arc<ConnectionRegistry>,
    io_timeout: Duration,
    forward_inbound: bool,
    running: Arc<AtomicBool>,
}

/// The multi-peer TCP relay.
pub struct BroadcastRelay {
    config: RelayConfig,
    sync: Arc<ClipboardSync>,
    registry: Arc<ConnectionRegistry>,
    runtime: Mutex<RelayRuntime>,
}

impl BroadcastRelay {
    pub fn new(config: RelayConfig, sync: Arc<ClipboardSync>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.io_timeout));
        Self {
            config,
            sync,
            registry,
            runtime: Mutex::new(RelayRuntime::default()),
        }
    }

    /// Binds a port, starts accepting peers and starts forwarding every
    /// update received on `updates` to all connected peers.
    ///
    /// Returns the bound port.
    ///
    /// # Errors
    ///
    /// - [`RelayError::Lifecycle`] if the relay is not `Stopped`.
    /// - [`RelayError::NoFreePort`] / [`RelayError::InvalidPortRange`] if no
    ///   port could be bound.  The relay is `Stopped` again afterwards.
    pub async fn start(&self, updates: mpsc::Receiver<ClipboardUpdate>) -> Result<u16, RelayError> {
        self.lock_runtime().phase.transition_to(RelayPhase::Starting)?;

        let listener = match bind_in_range(&self.config).await {
            Ok(listener) => listener,
            Err(e) => {
                self.lock_runtime().phase = RelayPhase::Stopped;
                error!("relay failed to start: {e}");
                return Err(e);
            }
        };
        let port = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(e) => {
                self.lock_runtime().phase = RelayPhase::Stopped;
                return Err(RelayError::NoFreePort {
                    address: self.config.bind_address,
                    first: self.config.base_port,
                    last: self.config.base_port,
                    source: e,
                });
            }
        };

        let running = Arc::new(AtomicBool::new(true));
        let context = Arc::new(PeerContext {
            sync: Arc::clone(&self.sync),
            registry: Arc::clone(&self.registry),
            io_timeout: self.config.io_timeout,
            forward_inbound: self.config.forward_inbound,
            running: Arc::clone(&running),
        });

        let accept_task = tokio::spawn(accept_loop(listener, Arc::clone(&context)));
        let forward_task = tokio::spawn(forward_local_updates(updates, context));

        let mut runtime = self.lock_runtime();
        runtime.phase.transition_to(RelayPhase::Running)?;
        runtime.bound_port = Some(port);
        runtime.running = Some(running);
        runtime.tasks = vec![accept_task, forward_task];
        info!("relay listening on {}:{port}", self.config.bind_address);
        Ok(port)
    }

    /// Stops accepting, closes every peer and returns to `Stopped`.
    ///
    /// Calling `stop` on a relay that is already stopped (or stopping) does
    /// nothing.  A stop request while the relay is still `Starting` is logged
    /// and ignored.
    pub async fn stop(&self) {
        let (running, tasks) = {
            let mut runtime = self.lock_runtime();
            match runtime.phase {
                RelayPhase::Stopped | RelayPhase::Stopping => {
                    debug!("relay stop ignored: already {:?}", runtime.phase);
                    return;
                }
                RelayPhase::Starting => {
                    warn!("relay stop ignored: start still in progress");
                    return;
                }
                RelayPhase::Running => {}
            }
            runtime.phase = RelayPhase::Stopping;
            (runtime.running.take(), std::mem::take(&mut runtime.tasks))
        };

        if let Some(running) = running {
            running.store(false, Ordering::Relaxed);
        }
        for task in tasks {
            if let Err(e) = task.await {
                warn!("relay task ended abnormally: {e}");
            }
        }
        self.registry.close_all().await;

        let mut runtime = self.lock_runtime();
        runtime.phase = RelayPhase::Stopped;
        runtime.bound_port = None;
        info!("relay stopped");
    }

    pub fn phase(&self) -> RelayPhase {
        self.lock_runtime().phase
    }

    /// The port the listener is bound to while running.
    pub fn bound_port(&self) -> Option<u16> {
        self.lock_runtime().bound_port
    }

    pub fn peer_count(&self) -> usize {
        self.registry.count()
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    fn lock_runtime(&self) -> MutexGuard<'_, RelayRuntime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Listener ──────────────────────────────────────────────────────────────────

/// Binds the first free port in `base_port .. base_port + port_range`.
async fn bind_in_range(config: &RelayConfig) -> Result<TcpListener, RelayError> {
    let invalid = RelayError::InvalidPortRange {
        base: config.base_port,
        count: config.port_range,
    };
    if config.port_range == 0 {
        return Err(invalid);
    }
    let last = config
        .base_port
        .checked_add(config.port_range - 1)
        .ok_or(invalid)?;

    let mut last_error = None;
    for port in config.base_port..=last {
        let addr = SocketAddr::new(config.bind_address, port);
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                debug!("port {port} unavailable: {e}");
                last_error = Some(e);
            }
        }
    }

    Err(RelayError::NoFreePort {
        address: config.bind_address,
        first: config.base_port,
        last,
        source: last_error
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::AddrInUse, "no port tried")),
    })
}

/// Accepts peers until the relay stops, then waits for every peer reader it
/// spawned.  When this task returns no reader can still register a peer.
async fn accept_loop(listener: TcpListener, context: Arc<PeerContext>) {
    let mut readers = JoinSet::new();

    while context.running.load(Ordering::Relaxed) {
        while readers.try_join_next().is_some() {}

        match timeout(context.io_timeout, listener.accept()).await {
            Err(_) => continue,
            Ok(Ok((stream, addr))) => {
                readers.spawn(serve_peer(stream, addr, Arc::clone(&context)));
            }
            Ok(Err(e)) => {
                // Typically EMFILE or a connection reset before accept.
                warn!("accept failed: {e}");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
    drop(listener);
    debug!("accept loop finished; waiting for {} peer reader(s)", readers.len());

    while let Some(joined) = readers.join_next().await {
        if let Err(e) = joined {
            warn!("peer reader ended abnormally: {e}");
        }
    }
}

// ── Peer reader ───────────────────────────────────────────────────────────────

async fn serve_peer(stream: TcpStream, addr: SocketAddr, context: Arc<PeerContext>) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("could not set TCP_NODELAY for {addr}: {e}");
    }
    if !context.running.load(Ordering::Relaxed) {
        debug!("dropping {addr}: relay stopping");
        return;
    }
    let (reader, writer) = stream.into_split();
    let id: PeerId = Uuid::new_v4();
    context
        .registry
        .add(PeerConnection::new(id, addr, Arc::new(TcpPeerSink::new(writer))));
    info!(
        "peer {addr} connected ({} connected)",
        context.registry.count()
    );

    let reason = read_peer(reader, id, addr, &context).await;

    context.registry.remove(id).await;
    info!(
        "peer {addr} disconnected: {reason} ({} connected)",
        context.registry.count()
    );
}

/// Reads lines from one peer until it disconnects, is removed from the
/// registry, or the relay stops.  Returns a short description of why.
async fn read_peer(
    mut reader: OwnedReadHalf,
    id: PeerId,
    addr: SocketAddr,
    context: &PeerContext,
) -> String {
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut lines = LineBuffer::new();

    loop {
        if !context.running.load(Ordering::Relaxed) {
            return "relay stopping".to_string();
        }
        if !context.registry.contains(id) {
            return "removed after failed write".to_string();
        }

        let n = match timeout(context.io_timeout, reader.read(&mut chunk)).await {
            Err(_) => continue,
            Ok(Ok(0)) => return "closed by peer".to_string(),
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return format!("read error: {e}"),
        };

        let complete = match lines.push(&chunk[..n]) {
            Ok(complete) => complete,
            Err(e) => {
                warn!("dropping peer {addr}: {e}");
                return e.to_string();
            }
        };
        for line in complete {
            handle_line(&line, id, addr, context).await;
        }
    }
}

/// Decodes one inbound line and applies it to the local clipboard.
///
/// Malformed or unsupported lines are logged and skipped; they never end the
/// connection.
async fn handle_line(line: &[u8], id: PeerId, addr: SocketAddr, context: &PeerContext) {
    let message = match decode_line(line) {
        Ok(message) => message,
        Err(e) => {
            debug!("discarding line from {addr}: {e}");
            return;
        }
    };
    let update = match message_to_update(message) {
        Ok(Some(update)) => update,
        Ok(None) => {
            debug!("ignoring non-clipboard message from {addr}");
            return;
        }
        Err(e) => {
            debug!("discarding line from {addr}: {e}");
            return;
        }
    };

    let sync = Arc::clone(&context.sync);
    let applied =
        tokio::task::spawn_blocking(move || sync.apply_remote(&update).map(|()| update)).await;
    let update = match applied {
        Ok(Ok(update)) => update,
        Ok(Err(e)) => {
            warn!("could not apply update from {addr}: {e}");
            return;
        }
        Err(e) => {
            error!("clipboard task failed: {e}");
            return;
        }
    };
    info!("received {} from {addr}", update.content().preview());

    if context.forward_inbound {
        match encode_update(&update) {
            Ok(line) => {
                let sent = context.registry.broadcast_except(&line, Some(id)).await;
                debug!("forwarded update from {addr} to {sent} other peer(s)");
            }
            Err(e) => warn!("could not re-encode update from {addr}: {e}"),
        }
    }
}

// ── Forwarder ─────────────────────────────────────────────────────────────────

/// Broadcasts every locally detected update to all connected peers.
async fn forward_local_updates(
    mut updates: mpsc::Receiver<ClipboardUpdate>,
    context: Arc<PeerContext>,
) {
    while context.running.load(Ordering::Relaxed) {
        let update = match timeout(context.io_timeout, updates.recv()).await {
            Err(_) => continue,
            Ok(None) => break,
            Ok(Some(update)) => update,
        };

        let line = match encode_update(&update) {
            Ok(line) => line,
            Err(e) => {
                warn!("could not encode local update: {e}");
                continue;
            }
        };
        let preview = update.content().preview();
        let sent = context.registry.broadcast(&line).await;
        if sent == 0 && context.registry.count() == 0 {
            info!("no peers connected; local copy {preview} not sent");
        } else {
            info!("sent {preview} to {sent} peer(s)");
        }
    }
    debug!("forwarder finished");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
