//! Storage infrastructure: configuration file persistence.
//!
//! ClipSync persists nothing but its settings; clipboard content is never
//! written to disk.  The `config` sub-module handles:
//!
//! - Reading the TOML configuration file from the platform-appropriate directory.
//! - Writing it back (`clipsync-host --write-config`).
//! - Providing defaults when the file does not exist yet (first run).

pub mod config;
