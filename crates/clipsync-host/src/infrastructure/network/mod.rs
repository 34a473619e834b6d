//! Network infrastructure for the ClipSync host.
//!
//! # Sub-modules
//!
//! - **`connection_registry`** – The internally synchronised set of connected
//!   peers.  Owns each peer's write half and implements broadcast with
//!   per-peer failure isolation.
//!
//! - **`relay`** – The TCP listener: port probing, the accept loop, one line
//!   reader per peer, and the forwarder that turns locally detected clipboard
//!   changes into broadcasts.
//!
//! - **`discovery`** – Periodic UDP broadcast advertising the relay's address
//!   so peers can connect without manual configuration.

pub mod connection_registry;
pub mod discovery;
pub mod relay;
