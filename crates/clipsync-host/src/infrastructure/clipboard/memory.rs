//! In-memory clipboard for tests and headless hosts.
//!
//! # Why an in-memory clipboard?
//!
//! The native clipboard:
//!
//! - Needs a desktop session (an X11/Wayland display, a Windows station).
//! - Is shared with every other program on the machine, so a test that writes
//!   to it can be disturbed by (or disturb) the developer's own copy/paste.
//!
//! `InMemoryClipboard` stores one [`ClipboardContent`] behind a mutex and
//! behaves like a real clipboard from the sync engine's point of view: writing
//! text replaces an image and vice versa.  It is also what the host binary
//! falls back to when built without the `system-clipboard` feature.
//!
//! # `set_failing`
//!
//! Call `set_failing(true)` to make every operation return
//! [`ClipboardError::Unavailable`], the same error a locked OS clipboard
//! produces.  This drives the detector's error path without a broken OS.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use clipsync_core::ClipboardContent;

use crate::application::sync_clipboard::{ClipboardAccess, ClipboardError};

/// A clipboard that lives entirely in process memory.
#[derive(Default)]
pub struct InMemoryClipboard {
    content: Mutex<Option<ClipboardContent>>,
    failing: AtomicBool,
    writes: AtomicUsize,
}

impl InMemoryClipboard {
    /// Creates an empty clipboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clipboard that already holds `text`.
    pub fn with_text(text: impl Into<String>) -> Self {
        let clipboard = Self::new();
        *clipboard.slot() = Some(ClipboardContent::Text(text.into()));
        clipboard
    }

    /// Simulates a user copy: replaces the content without counting a write.
    pub fn copy(&self, content: ClipboardContent) {
        *self.slot() = Some(content);
    }

    /// Returns a copy of the current content.
    pub fn current(&self) -> Option<ClipboardContent> {
        self.slot().clone()
    }

    /// Number of successful `set_text`/`set_image` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Makes every subsequent operation fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ClipboardError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(ClipboardError::Unavailable(
                "in-memory clipboard set to fail".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ClipboardContent>> {
        self.content.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, content: ClipboardContent) -> Result<(), ClipboardError> {
        self.check()?;
        *self.slot() = Some(content);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl ClipboardAccess for InMemoryClipboard {
    fn get_text(&self) -> Result<Option<String>, ClipboardError> {
        self.check()?;
        Ok(match &*self.slot() {
            Some(ClipboardContent::Text(text)) => Some(text.clone()),
            _ => None,
        })
    }

    fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        self.write(ClipboardContent::Text(text.to_string()))
    }

    fn has_text(&self) -> Result<bool, ClipboardError> {
        self.check()?;
        Ok(matches!(&*self.slot(), Some(ClipboardContent::Text(_))))
    }

    fn capture_image(&self) -> Result<Option<Vec<u8>>, ClipboardError> {
        self.check()?;
        Ok(match &*self.slot() {
            Some(ClipboardContent::Image(png)) => Some(png.clone()),
            _ => None,
        })
    }

    fn set_image(&self, png: &[u8]) -> Result<(), ClipboardError> {
        self.write(ClipboardContent::Image(png.to_vec()))
    }
}
