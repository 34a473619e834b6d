//! ConnectionRegistry: the set of connected peers and line broadcast.
//!
//! Every accepted TCP connection is split into a read half (owned by that
//! peer's reader task) and a write half.  The write half is wrapped in a
//! [`PeerSink`] and registered here; from then on the registry is the only
//! place that writes to the peer or closes it.
//!
//! # Locking (for beginners)
//!
//! The peer list is guarded by a plain `std::sync::Mutex`.  The lock is held
//! only to copy the list (a *snapshot*) or to take peers out of it, never
//! while writing to a socket.  A broadcast therefore looks like:
//!
//! ```text
//! lock ─ snapshot ─ unlock
//! write to every peer in the snapshot (each with its own timeout)
//! lock ─ remove peers whose write failed ─ unlock
//! close the removed peers
//! ```
//!
//! A peer that connects during a broadcast simply misses that line; a peer
//! that disconnects during one is removed by whichever side notices first.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::time::timeout;
use tracing::{debug, info};
use uuid::Uuid;

/// Identifier assigned to each accepted connection.
pub type PeerId = Uuid;

/// The writable side of a peer connection.
#[async_trait]
pub trait PeerSink: Send + Sync {
    /// Writes one complete, already-terminated line.
    async fn send_line(&self, line: &[u8]) -> io::Result<()>;

    /// Shuts the connection down.  Errors are ignored.
    async fn close(&self);
}

/// [`PeerSink`] over the write half of a TCP stream.
pub struct TcpPeerSink {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
}

impl TcpPeerSink {
    pub fn new(writer: OwnedWriteHalf) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(writer),
        }
    }
}

#[async_trait]
impl PeerSink for TcpPeerSink {
    async fn send_line(&self, line: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line).await?;
        writer.flush().await
    }

    async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// One registered peer.
#[derive(Clone)]
pub struct PeerConnection {
    id: PeerId,
    addr: SocketAddr,
    sink: Arc<dyn PeerSink>,
}

impl PeerConnection {
    pub fn new(id: PeerId, addr: SocketAddr, sink: Arc<dyn PeerSink>) -> Self {
        Self { id, addr, sink }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .finish()
    }
}

/// Internally synchronised set of connected peers.
pub struct ConnectionRegistry {
    peers: Mutex<Vec<PeerConnection>>,
    write_timeout: Duration,
}

impl ConnectionRegistry {
    /// Creates an empty registry.  Each individual write is abandoned (and
    /// the peer dropped) after `write_timeout`.
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            peers: Mutex::new(Vec::new()),
            write_timeout,
        }
    }

    /// Registers a peer.
    pub fn add(&self, peer: PeerConnection) {
        self.lock().push(peer);
    }

    /// Removes and closes the peer with `id`.
    ///
    /// Returns `false` if the peer was not registered (already removed).
    pub async fn remove(&self, id: PeerId) -> bool {
        let removed = {
            let mut peers = self.lock();
            peers
                .iter()
                .position(|p| p.id == id)
                .map(|index| peers.remove(index))
        };
        match removed {
            Some(peer) => {
                peer.sink.close().await;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.lock().iter().any(|p| p.id == id)
    }

    /// Point-in-time copy of the registered peers, in registration order.
    pub fn snapshot(&self) -> Vec<PeerConnection> {
        self.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Writes `line` to every registered peer.
    ///
    /// Returns the number of successful writes.  Peers whose write fails or
    /// times out are removed and closed before this returns.
    pub async fn broadcast(&self, line: &[u8]) -> usize {
        self.broadcast_except(line, None).await
    }

    /// Like [`broadcast`](Self::broadcast) but skips the peer with id
    /// `exclude` (typically the peer the line came from).
    pub async fn broadcast_except(&self, line: &[u8], exclude: Option<PeerId>) -> usize {
        let targets: Vec<PeerConnection> = self
            .snapshot()
            .into_iter()
            .filter(|p| Some(p.id) != exclude)
            .collect();
        if targets.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        let mut failed = Vec::new();
        for peer in targets {
            match timeout(self.write_timeout, peer.sink.send_line(line)).await {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    debug!("write to {} failed: {e}", peer.addr);
                    failed.push(peer);
                }
                Err(_) => {
                    debug!("write to {} timed out", peer.addr);
                    failed.push(peer);
                }
            }
        }

        if !failed.is_empty() {
            {
                let mut peers = self.lock();
                peers.retain(|p| !failed.iter().any(|f| f.id == p.id));
            }
            for peer in failed {
                info!("peer {} dropped after failed write", peer.addr);
                peer.sink.close().await;
            }
        }
        delivered
    }

    /// Removes and closes every peer.
    pub async fn close_all(&self) {
        let peers = std::mem::take(&mut *self.lock());
        for peer in peers {
            peer.sink.close().await;
        }
    }

    // Peer bookkeeping stays consistent even if a holder panicked.
    fn lock(&self) -> MutexGuard<'_, Vec<PeerConnection>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
