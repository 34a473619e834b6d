//! Content fingerprints.
//!
//! A [`Fingerprint`] is a BLAKE3 digest of the clipboard payload tagged with
//! the kind of content it came from.  Two fingerprints are equal exactly when
//! the kinds match and the payload bytes are identical (up to the negligible
//! collision probability of a 256-bit hash), so the detector never has to keep
//! a multi-megabyte PNG around just to compare it with the next capture.

use std::fmt;

use crate::protocol::messages::ClipboardContent;

/// The kind of clipboard content a fingerprint was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Text,
    Image,
}

/// Comparable identity of a clipboard payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    kind: ContentKind,
    digest: [u8; 32],
}

impl Fingerprint {
    /// Fingerprints arbitrary clipboard content.
    pub fn of(content: &ClipboardContent) -> Self {
        let kind = match content {
            ClipboardContent::Text(_) => ContentKind::Text,
            ClipboardContent::Image(_) => ContentKind::Image,
        };
        Self::from_bytes(kind, content.as_bytes())
    }

    /// Fingerprints text without building a [`ClipboardContent`] first.
    pub fn of_text(text: &str) -> Self {
        Self::from_bytes(ContentKind::Text, text.as_bytes())
    }

    /// Fingerprints encoded PNG bytes.
    pub fn of_image(png: &[u8]) -> Self {
        Self::from_bytes(ContentKind::Image, png)
    }

    fn from_bytes(kind: ContentKind, bytes: &[u8]) -> Self {
        Self {
            kind,
            digest: *blake3::hash(bytes).as_bytes(),
        }
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first 8 bytes are plenty to tell fingerprints apart in logs.
        write!(f, "{:?}:", self.kind)?;
        for byte in &self.digest[..8] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}
