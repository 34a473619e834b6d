//! Clipboard backends and the polling change detector.
//!
//! The native backend is compiled in through the `system-clipboard` feature,
//! which is on by default.  The in-memory backend is always available.

pub mod memory;
pub mod monitor;

#[cfg(feature = "system-clipboard")]
pub mod system;
