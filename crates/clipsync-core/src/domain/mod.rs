//! Domain entities for ClipSync.
//!
//! This module contains pure logic with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain**.  Domain code:
//!
//! - Contains the core rules of the application.
//! - Has **no** imports from OS APIs, network libraries, or UI frameworks.
//! - Can be compiled and tested on any platform without any external setup.
//!
//! For ClipSync the core rule is deceptively small: "only announce clipboard
//! content that is genuinely new".  Content is reduced to a [`Fingerprint`]
//! and compared against the single last-seen slot held by [`SyncState`].
//!
//! [`Fingerprint`]: fingerprint::Fingerprint
//! [`SyncState`]: sync_state::SyncState

pub mod fingerprint;
pub mod sync_state;
