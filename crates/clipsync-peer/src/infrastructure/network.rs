//! Relay connection for the peer.
//!
//! [`PeerClient`] connects to a host's relay, turns every inbound line into a
//! [`ClipboardUpdate`] and forwards it on an `mpsc` channel as a
//! [`PeerEvent`].  Text typed on the peer goes back the other way through
//! [`PeerClient::send_text`].
//!
//! Architecture:
//! - The TCP stream is split; the read half is owned by the read loop and the
//!   write half sits behind a mutex so sends can come from any task.
//! - When the connection drops the client waits `reconnect_interval` and dials
//!   again, until `running` is cleared.  With no reconnect interval the loop
//!   ends after the first connection.
//! - Lines that fail to decode, and message types other than `clipboard`, are
//!   logged and skipped.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use clipsync_core::protocol::codec::message_to_update;
use clipsync_core::protocol::messages::DEFAULT_RELAY_PORT;
use clipsync_core::{decode_line, encode_update, ClipboardUpdate, LineBuffer, ProtocolError};
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{tcp::OwnedReadHalf, tcp::OwnedWriteHalf, TcpStream},
    sync::{mpsc, Mutex},
    time,
};
use tracing::{debug, error, info, warn};

/// How long a read may block before the `running` flag is checked again.
const READ_POLL: Duration = Duration::from_millis(250);

/// Size of one socket read.
const READ_CHUNK: usize = 64 * 1024;

/// Errors that can occur in the peer network layer.
#[derive(Debug, Error)]
pub enum PeerError {
    /// TCP connection to the relay failed.
    #[error("failed to connect to relay at {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// The relay did not accept the connection in time.
    #[error("timed out after {after:?} connecting to relay at {addr}")]
    ConnectTimeout { addr: SocketAddr, after: Duration },
    /// An I/O error occurred on the established connection.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// There is no open connection to send on.
    #[error("not connected to a relay")]
    NotConnected,
}

/// Configuration for the peer's relay connection.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Address of the host's relay.
    pub relay_addr: SocketAddr,
    /// Upper bound on a single connection attempt.
    pub connect_timeout: Duration,
    /// Delay before reconnecting; `None` gives up after the first connection.
    pub reconnect_interval: Option<Duration>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            relay_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_RELAY_PORT),
            connect_timeout: Duration::from_secs(5),
            reconnect_interval: Some(Duration::from_secs(5)),
        }
    }
}

/// Events emitted by the network layer to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// The TCP connection was established.
    Connected { relay_addr: SocketAddr },
    /// The host broadcast a clipboard change.
    Update(ClipboardUpdate),
    /// The TCP connection was lost or could not be made.
    Disconnected,
}

/// Manages the TCP connection from a peer to a host's relay.
pub struct PeerClient {
    config: PeerConfig,
    write_half: Arc<Mutex<Option<OwnedWriteHalf>>>,
}

impl PeerClient {
    /// Creates a new (not yet connected) client.
    pub fn new(config: PeerConfig) -> Self {
        Self {
            config,
            write_half: Arc::new(Mutex::new(None)),
        }
    }

    pub fn relay_addr(&self) -> SocketAddr {
        self.config.relay_addr
    }

    /// Connects to the relay and begins reading updates.
    ///
    /// Returns a channel receiver that delivers [`PeerEvent`]s.  The
    /// connection task keeps running until `running` is cleared, the
    /// receiver is dropped, or (without a reconnect interval) the first
    /// connection ends.
    pub async fn start(self: Arc<Self>, running: Arc<AtomicBool>) -> mpsc::Receiver<PeerEvent> {
        let (tx, rx) = mpsc::channel(64);
        let this = Arc::clone(&self);

        tokio::spawn(async move {
            while running.load(Ordering::Relaxed) {
                match this.connect().await {
                    Ok(reader) => {
                        let relay_addr = this.config.relay_addr;
                        info!("connected to relay at {relay_addr}");
                        if tx.send(PeerEvent::Connected { relay_addr }).await.is_err() {
                            break;
                        }

                        this.read_loop(reader, &tx, &running).await;
                        this.disconnect().await;

                        if tx.send(PeerEvent::Disconnected).await.is_err() {
                            break;
                        }
                        info!("disconnected from relay at {relay_addr}");
                    }
                    Err(e) => {
                        warn!("{e}");
                        if tx.send(PeerEvent::Disconnected).await.is_err() {
                            break;
                        }
                    }
                }

                match this.config.reconnect_interval {
                    Some(interval) if running.load(Ordering::Relaxed) => {
                        debug!("reconnecting in {interval:?}");
                        time::sleep(interval).await;
                    }
                    _ => break,
                }
            }
        });

        rx
    }

    /// Opens the TCP connection, stores the write half, returns the read half.
    async fn connect(&self) -> Result<OwnedReadHalf, PeerError> {
        let addr = self.config.relay_addr;
        let after = self.config.connect_timeout;
        let stream = match time::timeout(after, TcpStream::connect(addr)).await {
            Err(_) => return Err(PeerError::ConnectTimeout { addr, after }),
            Ok(Err(source)) => return Err(PeerError::ConnectFailed { addr, source }),
            Ok(Ok(stream)) => stream,
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not set TCP_NODELAY: {e}");
        }
        let (reader, writer) = stream.into_split();
        *self.write_half.lock().await = Some(writer);
        Ok(reader)
    }

    /// Reads lines from the relay and forwards decoded updates on `tx`.
    async fn read_loop(
        &self,
        mut reader: OwnedReadHalf,
        tx: &mpsc::Sender<PeerEvent>,
        running: &AtomicBool,
    ) {
        let mut chunk = vec![0u8; READ_CHUNK];
        let mut lines = LineBuffer::new();

        while running.load(Ordering::Relaxed) {
            let n = match time::timeout(READ_POLL, reader.read(&mut chunk)).await {
                Err(_) => continue,
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    error!("read error on relay connection: {e}");
                    break;
                }
            };

            let complete = match lines.push(&chunk[..n]) {
                Ok(complete) => complete,
                Err(e) => {
                    warn!("closing relay connection: {e}");
                    break;
                }
            };

            for line in complete {
                let update = match decode_line(&line).and_then(message_to_update) {
                    Ok(Some(update)) => update,
                    Ok(None) => {
                        debug!("ignoring non-clipboard message");
                        continue;
                    }
                    Err(e) => {
                        warn!("skipping undecodable line: {e}");
                        continue;
                    }
                };
                debug!("received {}", update.content().preview());
                if tx.send(PeerEvent::Update(update)).await.is_err() {
                    return;
                }
            }
        }
    }

    /// Encodes and sends one update to the relay.
    ///
    /// # Errors
    ///
    /// - [`PeerError::NotConnected`] if there is no open connection.
    /// - [`PeerError::Io`] if the write fails.
    pub async fn send_update(&self, update: &ClipboardUpdate) -> Result<(), PeerError> {
        let bytes = encode_update(update)?;
        let mut guard = self.write_half.lock().await;
        let writer = guard.as_mut().ok_or(PeerError::NotConnected)?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Sends `text` to the host clipboard, stamped with the current time.
    ///
    /// # Errors
    ///
    /// See [`send_update`](Self::send_update).
    pub async fn send_text(&self, text: &str) -> Result<(), PeerError> {
        self.send_update(&ClipboardUpdate::text(text)).await
    }

    pub async fn is_connected(&self) -> bool {
        self.write_half.lock().await.is_some()
    }

    /// Shuts down the write half, if any.  The relay sees end-of-stream.
    pub async fn disconnect(&self) {
        if let Some(mut writer) = self.write_half.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("shutdown of relay connection failed: {e}");
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
