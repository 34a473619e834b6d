//! Writes received PNG images to a directory.
//!
//! Each image is saved as `clipboard_<captured_at_ms>.png`.  Two images
//! stamped with the same millisecond get a `_1`, `_2`, ... suffix instead of
//! overwriting each other.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Saves `png` and returns the path written.  Creates the directory if
    /// needed.
    ///
    /// # Errors
    ///
    /// Propagates file system errors.
    pub fn save(&self, png: &[u8], captured_at_ms: i64) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let mut path = self.dir.join(file_name(captured_at_ms, 0));
        let mut attempt = 0u32;
        while path.exists() {
            attempt += 1;
            path = self.dir.join(file_name(captured_at_ms, attempt));
        }

        fs::write(&path, png)?;
        info!("saved {} byte image to {}", png.len(), path.display());
        Ok(path)
    }
}

fn file_name(captured_at_ms: i64, attempt: u32) -> String {
    if attempt == 0 {
        format!("clipboard_{captured_at_ms}.png")
    } else {
        format!("clipboard_{captured_at_ms}_{attempt}.png")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
