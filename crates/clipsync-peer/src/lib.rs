//! clipsync-peer library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does clipsync-peer do? (for beginners)
//!
//! The *peer* is the other end of a ClipSync relay: usually a phone, here a
//! small command-line program that behaves like one.  It:
//!
//! 1. Listens for the host's UDP discovery beacons and keeps a table of the
//!    hosts it has heard from recently.
//! 2. Connects to a host's relay over TCP (by address, or the first host
//!    discovered).
//! 3. Receives every clipboard change the host broadcasts: text is printed,
//!    PNG images are written to a directory.
//! 4. Optionally sends a piece of text to the host, which lands on the host
//!    clipboard.

/// Infrastructure layer: discovery listener, relay connection, image files.
pub mod infrastructure;
