//! SyncClipboardUseCase: change detection and remote-apply with loopback
//! suppression.
//!
//! This use case owns the single piece of state that both directions of the
//! sync touch: the last-seen [`Fingerprint`].  It talks to the clipboard only
//! through the [`ClipboardAccess`] trait, so the same logic runs against the
//! native clipboard, the in-memory clipboard, or a `mockall` mock.
//!
//! # Two directions, one lock (for beginners)
//!
//! ```text
//!  detector tick ──► detect_change() ──┐
//!                                      ├──► Mutex<SyncState>
//!  peer line     ──► apply_remote()  ──┘
//! ```
//!
//! `detect_change` reads the clipboard, fingerprints it and compares it with
//! the last-seen slot.  `apply_remote` writes a peer's content to the
//! clipboard and records its fingerprint.  Both hold the same mutex for the
//! whole read-compare-record (or write-record) step.  Without that, a detector
//! tick could read the clipboard *after* the relay wrote "world" but compare it
//! *before* the relay recorded it, and "world" would be bounced straight back
//! to every peer.
//!
//! Clipboard calls are blocking.  Async callers run these methods inside
//! `tokio::task::spawn_blocking`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use clipsync_core::{ClipboardContent, ClipboardUpdate, Fingerprint, SyncState};
use thiserror::Error;
use tracing::debug;

/// Error type for clipboard access operations.
///
/// Every variant is transient from the sync engine's point of view: the
/// detector logs it and tries again on the next tick.
#[derive(Debug, Error, PartialEq)]
pub enum ClipboardError {
    /// The clipboard is temporarily held by another process.
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),
    /// The platform clipboard API reported an error.
    #[error("platform error: {0}")]
    Platform(String),
    /// The backend cannot handle this kind of content.
    #[error("unsupported clipboard content: {0}")]
    Unsupported(String),
}

/// Platform-agnostic clipboard capability.
///
/// Each backend (native clipboard, in-memory clipboard) provides an
/// implementation in the infrastructure layer.
#[cfg_attr(test, mockall::automock)]
pub trait ClipboardAccess: Send + Sync {
    /// Returns the current clipboard text, or `None` if the clipboard holds no text.
    fn get_text(&self) -> Result<Option<String>, ClipboardError>;

    /// Replaces the clipboard contents with `text`.
    fn set_text(&self, text: &str) -> Result<(), ClipboardError>;

    /// Returns `true` if the clipboard currently holds text.
    fn has_text(&self) -> Result<bool, ClipboardError>;

    /// Returns the current clipboard image as encoded PNG bytes, if any.
    fn capture_image(&self) -> Result<Option<Vec<u8>>, ClipboardError>;

    /// Replaces the clipboard contents with the PNG image `png`.
    fn set_image(&self, png: &[u8]) -> Result<(), ClipboardError>;
}

/// The Sync Clipboard use case.
pub struct ClipboardSync {
    clipboard: Arc<dyn ClipboardAccess>,
    state: Mutex<SyncState>,
}

impl ClipboardSync {
    /// Creates a new use case with an empty last-seen slot.
    pub fn new(clipboard: Arc<dyn ClipboardAccess>) -> Self {
        Self {
            clipboard,
            state: Mutex::new(SyncState::new()),
        }
    }

    /// Reads the clipboard and returns an update if its content is new.
    ///
    /// An image takes priority over text.  Text that is empty or only
    /// whitespace is ignored.  Content equal to the last detected or last
    /// applied content yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`ClipboardError`] if the clipboard could not be read.  The
    /// last-seen slot is left untouched in that case.
    pub fn detect_change(&self) -> Result<Option<ClipboardUpdate>, ClipboardError> {
        let mut state = self.lock_state();

        let Some(content) = self.read_current()? else {
            return Ok(None);
        };

        if state.observe(Fingerprint::of(&content)) {
            debug!("local clipboard changed: {}", content.preview());
            Ok(Some(ClipboardUpdate::now(content)))
        } else {
            Ok(None)
        }
    }

    /// Writes a peer's update to the clipboard and records it so the next
    /// [`detect_change`](Self::detect_change) does not report it.
    ///
    /// The write always happens, even if the content equals the last-seen
    /// value: the local user may have copied something else in between
    /// without a detector tick noticing.
    ///
    /// What gets recorded is the content read back right after the write,
    /// because a backend may not return the bytes it was given.  The native
    /// clipboard stores images as pixels and re-encodes them to PNG on every
    /// read.  If the read-back fails or finds nothing, the update's own
    /// content is recorded instead.
    ///
    /// # Errors
    ///
    /// Returns [`ClipboardError`] if the clipboard write fails.  Nothing is
    /// recorded in that case.
    pub fn apply_remote(&self, update: &ClipboardUpdate) -> Result<(), ClipboardError> {
        let mut state = self.lock_state();

        match update.content() {
            ClipboardContent::Text(text) => self.clipboard.set_text(text)?,
            ClipboardContent::Image(png) => self.clipboard.set_image(png)?,
        }

        let fingerprint = match self.read_current() {
            Ok(Some(stored)) => Fingerprint::of(&stored),
            Ok(None) => Fingerprint::of(update.content()),
            Err(e) => {
                debug!("read-back after remote apply failed: {e}");
                Fingerprint::of(update.content())
            }
        };
        state.record(fingerprint);
        Ok(())
    }

    /// Forgets the last-seen content.  Called when the service (re)starts.
    pub fn reset(&self) {
        self.lock_state().clear();
    }

    fn read_current(&self) -> Result<Option<ClipboardContent>, ClipboardError> {
        if let Some(png) = self.clipboard.capture_image()? {
            if !png.is_empty() {
                return Ok(Some(ClipboardContent::Image(png)));
            }
        }

        if !self.clipboard.has_text()? {
            return Ok(None);
        }
        match self.clipboard.get_text()? {
            Some(text) if !text.trim().is_empty() => Ok(Some(ClipboardContent::Text(text))),
            _ => Ok(None),
        }
    }

    // A panic while holding the lock cannot leave `SyncState` half-updated,
    // so a poisoned lock is still usable.
    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    /// A mock clipboard holding `text` and no image.
    fn text_clipboard(text: &'static str) -> MockClipboardAccess {
        let mut mock = MockClipboardAccess::new();
        mock.expect_capture_image().returning(|| Ok(None));
        mock.expect_has_text().returning(|| Ok(true));
        mock.expect_get_text()
            .returning(move || Ok(Some(text.to_string())));
        mock
    }

    #[test]
    fn test_detect_change_reports_new_text() {
        // Arrange
        let sync = ClipboardSync::new(Arc::new(text_clipboard("hello")));

        // Act
        let update = sync.detect_change().unwrap();

        // Assert
        let update = update.expect("first observation must be reported");
        assert_eq!(
            update.content(),
            &ClipboardContent::Text("hello".to_string())
        );
    }

    #[test]
    fn test_detect_change_same_content_twice_reports_once() {
        // Arrange
        let sync = ClipboardSync::new(Arc::new(text_clipboard("hello")));

        // Act
        let first = sync.detect_change().unwrap();
        let second = sync.detect_change().unwrap();

        // Assert
        assert!(first.is_some());
        assert!(second.is_none(), "unchanged content must not be re-emitted");
    }

    #[test]
    fn test_detect_change_ignores_whitespace_only_text() {
        let sync = ClipboardSync::new(Arc::new(text_clipboard("  \n\t ")));
        assert_eq!(sync.detect_change().unwrap(), None);
    }

    #[test]
    fn test_detect_change_ignores_empty_clipboard() {
        // Arrange
        let mut mock = MockClipboardAccess::new();
        mock.expect_capture_image().returning(|| Ok(None));
        mock.expect_has_text().returning(|| Ok(false));
        mock.expect_get_text().never();
        let sync = ClipboardSync::new(Arc::new(mock));

        // Act / Assert
        assert_eq!(sync.detect_change().unwrap(), None);
    }

    #[test]
    fn test_detect_change_prefers_image_over_text() {
        // Arrange
        let mut mock = MockClipboardAccess::new();
        mock.expect_capture_image()
            .returning(|| Ok(Some(vec![0x89, b'P', b'N', b'G'])));
        mock.expect_has_text().never();
        mock.expect_get_text().never();
        let sync = ClipboardSync::new(Arc::new(mock));

        // Act
        let update = sync.detect_change().unwrap().expect("image is new");

        // Assert
        assert!(matches!(update.content(), ClipboardContent::Image(_)));
    }

    #[test]
    fn test_detect_change_propagates_read_error_without_recording() {
        // Arrange – first read fails, second succeeds with the same text
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let mut mock = MockClipboardAccess::new();
        mock.expect_capture_image().returning(move || {
            if calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                Err(ClipboardError::Unavailable("locked".to_string()))
            } else {
                Ok(None)
            }
        });
        mock.expect_has_text().returning(|| Ok(true));
        mock.expect_get_text()
            .returning(|| Ok(Some("after".to_string())));
        let sync = ClipboardSync::new(Arc::new(mock));

        // Act
        let failed = sync.detect_change();
        let recovered = sync.detect_change().unwrap();

        // Assert
        assert_eq!(
            failed,
            Err(ClipboardError::Unavailable("locked".to_string()))
        );
        assert!(recovered.is_some());
    }

    #[test]
    fn test_apply_remote_writes_text_and_suppresses_echo() {
        // Arrange – clipboard reads back whatever the relay wrote
        let mut mock = MockClipboardAccess::new();
        mock.expect_set_text()
            .with(eq("world"))
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_capture_image().returning(|| Ok(None));
        mock.expect_has_text().returning(|| Ok(true));
        mock.expect_get_text()
            .returning(|| Ok(Some("world".to_string())));
        let sync = ClipboardSync::new(Arc::new(mock));

        // Act
        sync.apply_remote(&ClipboardUpdate::text("world")).unwrap();
        let detected = sync.detect_change().unwrap();

        // Assert
        assert!(detected.is_none(), "applied remote text must not echo");
    }

    #[test]
    fn test_apply_remote_writes_image() {
        // Arrange
        let png = vec![1u8, 2, 3];
        let stored = png.clone();
        let mut mock = MockClipboardAccess::new();
        mock.expect_set_image()
            .with(eq(png.clone()))
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_capture_image()
            .returning(move || Ok(Some(stored.clone())));
        let sync = ClipboardSync::new(Arc::new(mock));

        // Act / Assert
        assert!(sync.apply_remote(&ClipboardUpdate::image(png)).is_ok());
        assert_eq!(sync.detect_change().unwrap(), None);
    }

    #[test]
    fn test_apply_remote_image_reencoded_by_backend_is_not_echoed() {
        // Arrange – the backend hands back different PNG bytes for the
        // same picture, as the native clipboard does
        let mut mock = MockClipboardAccess::new();
        mock.expect_set_image().times(1).returning(|_| Ok(()));
        mock.expect_capture_image()
            .returning(|| Ok(Some(vec![0x89, b'P', b'N', b'G', 0xAA, 0xBB])));
        mock.expect_has_text().never();
        let sync = ClipboardSync::new(Arc::new(mock));

        // Act
        sync.apply_remote(&ClipboardUpdate::image(vec![0x89, b'P', b'N', b'G', 0x01]))
            .unwrap();
        let detected = sync.detect_change().unwrap();

        // Assert
        assert_eq!(detected, None, "re-encoded inbound image must not echo");
    }

    #[test]
    fn test_apply_remote_records_sent_content_when_read_back_fails() {
        // Arrange – read-back fails once, then the clipboard holds "world"
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let mut mock = MockClipboardAccess::new();
        mock.expect_set_text().returning(|_| Ok(()));
        mock.expect_capture_image().returning(move || {
            if calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                Err(ClipboardError::Unavailable("locked".to_string()))
            } else {
                Ok(None)
            }
        });
        mock.expect_has_text().returning(|| Ok(true));
        mock.expect_get_text()
            .returning(|| Ok(Some("world".to_string())));
        let sync = ClipboardSync::new(Arc::new(mock));

        // Act
        let applied = sync.apply_remote(&ClipboardUpdate::text("world"));
        let detected = sync.detect_change().unwrap();

        // Assert
        assert!(applied.is_ok());
        assert_eq!(detected, None);
    }

    #[test]
    fn test_apply_remote_failure_does_not_record() {
        // Arrange – the write fails, but the clipboard already holds "world"
        let mut mock = MockClipboardAccess::new();
        mock.expect_set_text()
            .returning(|_| Err(ClipboardError::Platform("denied".to_string())));
        mock.expect_capture_image().returning(|| Ok(None));
        mock.expect_has_text().returning(|| Ok(true));
        mock.expect_get_text()
            .returning(|| Ok(Some("world".to_string())));
        let sync = ClipboardSync::new(Arc::new(mock));

        // Act
        let applied = sync.apply_remote(&ClipboardUpdate::text("world"));
        let detected = sync.detect_change().unwrap();

        // Assert
        assert!(applied.is_err());
        assert!(detected.is_some());
    }

    #[test]
    fn test_reset_makes_current_content_new_again() {
        // Arrange
        let sync = ClipboardSync::new(Arc::new(text_clipboard("hello")));
        sync.detect_change().unwrap();

        // Act
        sync.reset();

        // Assert
        assert!(sync.detect_change().unwrap().is_some());
    }
}
