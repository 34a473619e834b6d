//! Infrastructure layer for the ClipSync host.
//!
//! Contains OS-facing adapters: clipboard backends and the polling detector,
//! network sockets, configuration file storage, and the service that wires
//! them together.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `clipsync_core`, but MUST NOT be imported by the `application` layer.

pub mod clipboard;
pub mod network;
pub mod service;
pub mod storage;
