//! Application layer use cases for the ClipSync host.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure rules in `clipsync-core`) and the infrastructure (clipboard, sockets,
//! files).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil a goal (e.g., "tell every peer
//!   about a new local copy, but never echo back what a peer just sent").
//! - **Depend on abstractions** (traits) rather than concrete implementations,
//!   so the native clipboard can be swapped for an in-memory one in tests.
//! - **Contain no OS calls, no network I/O, no file system access**.
//!
//! # Sub-modules
//!
//! - **`sync_clipboard`** – Change detection and remote-apply around the
//!   shared last-seen fingerprint, plus the [`ClipboardAccess`] trait every
//!   clipboard backend implements.
//!
//! - **`relay_lifecycle`** – The `Stopped → Starting → Running → Stopping`
//!   state machine the relay follows.
//!
//! [`ClipboardAccess`]: sync_clipboard::ClipboardAccess

pub mod relay_lifecycle;
pub mod sync_clipboard;
