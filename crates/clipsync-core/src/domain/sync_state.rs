//! Last-seen clipboard state used for change detection and loopback
//! suppression.
//!
//! # Why a single slot? (for beginners)
//!
//! The host must answer one question on every poll: "is what I see on the
//! clipboard right now something nobody has announced yet?"  Content can reach
//! the clipboard in two ways:
//!
//! 1. The user copies something locally.  The detector sees it, announces it,
//!    and remembers its fingerprint.
//! 2. A peer sends something and the relay writes it to the clipboard.  The
//!    relay remembers its fingerprint too, so the detector's next poll finds
//!    "nothing new" and does not echo it straight back (loopback suppression).
//!
//! Both paths record into the same slot.  Because a fingerprint is tagged with
//! its content kind, switching from text to an image (or back) always counts
//! as a change, and recording the new kind implicitly forgets the old one.
//!
//! `SyncState` itself is not synchronised; the host wraps it in a mutex that
//! is held for the whole read-compare-record (or write-record) step.

use crate::domain::fingerprint::Fingerprint;

/// Single-slot record of the most recently announced or applied content.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncState {
    last_seen: Option<Fingerprint>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `fingerprint` if it differs from the last seen one.
    ///
    /// Returns `true` when the content is new (and has now been recorded),
    /// `false` when it matches what was last seen.
    pub fn observe(&mut self, fingerprint: Fingerprint) -> bool {
        if self.last_seen == Some(fingerprint) {
            return false;
        }
        self.last_seen = Some(fingerprint);
        true
    }

    /// Unconditionally records `fingerprint` as the last seen content.
    ///
    /// Used after writing remote content to the local clipboard.
    pub fn record(&mut self, fingerprint: Fingerprint) {
        self.last_seen = Some(fingerprint);
    }

    pub fn last_seen(&self) -> Option<Fingerprint> {
        self.last_seen
    }

    /// Forgets the last seen content.
    pub fn clear(&mut self) {
        self.last_seen = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_has_nothing_seen() {
        assert_eq!(SyncState::new().last_seen(), None);
    }

    #[test]
    fn test_observe_reports_first_content_as_new() {
        let mut state = SyncState::new();
        assert!(state.observe(Fingerprint::of_text("a")));
    }

    #[test]
    fn test_observe_same_fingerprint_twice_is_not_new() {
        // Arrange
        let mut state = SyncState::new();
        state.observe(Fingerprint::of_text("a"));

        // Act
        let second = state.observe(Fingerprint::of_text("a"));

        // Assert
        assert!(!second);
    }

    #[test]
    fn test_recorded_remote_content_suppresses_detection() {
        // Arrange – relay applied "world" from a peer
        let mut state = SyncState::new();
        state.record(Fingerprint::of_text("world"));

        // Act – detector sees "world" on the clipboard
        let is_new = state.observe(Fingerprint::of_text("world"));

        // Assert
        assert!(!is_new);
    }

    #[test]
    fn test_switching_kind_counts_as_change_and_forgets_previous() {
        // Arrange
        let mut state = SyncState::new();
        state.observe(Fingerprint::of_text("a"));

        // Act – text → image → same text again
        let image_new = state.observe(Fingerprint::of_image(&[1, 2, 3]));
        let text_again_new = state.observe(Fingerprint::of_text("a"));

        // Assert
        assert!(image_new);
        assert!(text_again_new, "text cache must be cleared by the image");
    }

    #[test]
    fn test_clear_forgets_last_seen() {
        let mut state = SyncState::new();
        state.record(Fingerprint::of_text("a"));
        state.clear();
        assert!(state.observe(Fingerprint::of_text("a")));
    }
}
