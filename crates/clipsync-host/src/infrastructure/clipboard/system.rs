//! Native clipboard adapter backed by `arboard`.
//!
//! `arboard` exposes images as raw RGBA pixels, while the sync engine and the
//! wire protocol speak encoded PNG.  This adapter converts in both directions
//! with the `image` crate.
//!
//! # Error mapping
//!
//! | `arboard::Error`          | [`ClipboardError`]        |
//! |---------------------------|---------------------------|
//! | `ContentNotAvailable`     | `Ok(None)` (not an error) |
//! | `ClipboardOccupied`       | `Unavailable`             |
//! | `ClipboardNotSupported`   | `Unsupported`             |
//! | anything else             | `Platform`                |

use std::borrow::Cow;
use std::io::Cursor;
use std::sync::{Mutex, MutexGuard, PoisonError};

use arboard::{Clipboard, ImageData};
use image::{ImageFormat, RgbaImage};
use tracing::debug;

use crate::application::sync_clipboard::{ClipboardAccess, ClipboardError};

/// The operating system clipboard.
pub struct SystemClipboard {
    inner: Mutex<Clipboard>,
}

impl SystemClipboard {
    /// Opens the native clipboard.
    ///
    /// # Errors
    ///
    /// Returns [`ClipboardError`] if no clipboard is available (for example a
    /// Linux session without a display server).
    pub fn new() -> Result<Self, ClipboardError> {
        let clipboard = Clipboard::new().map_err(map_error)?;
        Ok(Self {
            inner: Mutex::new(clipboard),
        })
    }

    fn clipboard(&self) -> MutexGuard<'_, Clipboard> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ClipboardAccess for SystemClipboard {
    fn get_text(&self) -> Result<Option<String>, ClipboardError> {
        match self.clipboard().get_text() {
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(map_error(e)),
        }
    }

    fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        self.clipboard().set_text(text).map_err(map_error)
    }

    fn has_text(&self) -> Result<bool, ClipboardError> {
        Ok(self.get_text()?.is_some_and(|text| !text.is_empty()))
    }

    fn capture_image(&self) -> Result<Option<Vec<u8>>, ClipboardError> {
        let image = match self.clipboard().get_image() {
            Ok(image) => image,
            Err(arboard::Error::ContentNotAvailable) => return Ok(None),
            Err(e) => return Err(map_error(e)),
        };
        rgba_to_png(image).map(Some)
    }

    fn set_image(&self, png: &[u8]) -> Result<(), ClipboardError> {
        let image = png_to_rgba(png)?;
        self.clipboard().set_image(image).map_err(map_error)
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

fn rgba_to_png(image: ImageData<'_>) -> Result<Vec<u8>, ClipboardError> {
    let (width, height) = (image.width as u32, image.height as u32);
    let buffer = RgbaImage::from_raw(width, height, image.bytes.into_owned()).ok_or_else(|| {
        ClipboardError::Platform(format!("clipboard image {width}x{height} has a short buffer"))
    })?;

    let mut png = Vec::new();
    buffer
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| ClipboardError::Platform(format!("PNG encode failed: {e}")))?;
    debug!("captured {width}x{height} clipboard image ({} bytes)", png.len());
    Ok(png)
}

fn png_to_rgba(png: &[u8]) -> Result<ImageData<'static>, ClipboardError> {
    let decoded = image::load_from_memory_with_format(png, ImageFormat::Png)
        .map_err(|e| ClipboardError::Unsupported(format!("PNG decode failed: {e}")))?
        .to_rgba8();
    Ok(ImageData {
        width: decoded.width() as usize,
        height: decoded.height() as usize,
        bytes: Cow::Owned(decoded.into_raw()),
    })
}

fn map_error(e: arboard::Error) -> ClipboardError {
    match e {
        arboard::Error::ClipboardOccupied => ClipboardError::Unavailable(e.to_string()),
        arboard::Error::ClipboardNotSupported => ClipboardError::Unsupported(e.to_string()),
        other => ClipboardError::Platform(other.to_string()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
