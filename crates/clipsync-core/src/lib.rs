//! # clipsync-core
//!
//! Shared library for ClipSync containing the line-delimited JSON wire
//! protocol, the UDP discovery datagram, and the clipboard fingerprint state
//! used for change detection and loopback suppression.
//!
//! This crate is used by both the host relay and the peer client.
//! It has zero dependencies on OS clipboard APIs or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! ClipSync keeps the clipboard of a desktop "host" and one or more "peers"
//! (usually phones) in step over the local network.  When you copy something
//! on the host, every connected peer receives it a moment later; when a peer
//! sends text back, it lands on the host clipboard.
//!
//! This crate (`clipsync-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – How bytes travel over the network.  Every clipboard
//!   message is one JSON object on one line, terminated by `\n`.  Images are
//!   carried as base64-encoded PNG bytes.  The same module also defines the
//!   JSON datagram the host broadcasts so peers can find it.
//!
//! - **`domain`** – Pure logic with no OS dependencies: content fingerprints
//!   and the single-slot "last seen" state that stops the host from
//!   re-broadcasting what it has just written to its own clipboard.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `clipsync_core::ClipboardUpdate` instead of the full module path.
pub use domain::fingerprint::{ContentKind, Fingerprint};
pub use domain::sync_state::SyncState;
pub use protocol::codec::{decode_line, encode_update, LineBuffer, ProtocolError};
pub use protocol::messages::{
    ClipboardContent, ClipboardUpdate, ContentType, DiscoveryMessage, MessageKind, WireMessage,
};
