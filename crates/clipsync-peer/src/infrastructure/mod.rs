//! Infrastructure layer for the ClipSync peer.
//!
//! Everything here touches a socket or the file system; the message types it
//! exchanges come from `clipsync_core`.

pub mod discovery;
pub mod image_store;
pub mod network;
