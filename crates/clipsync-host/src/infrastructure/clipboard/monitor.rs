//! Fixed-interval clipboard change detector.
//!
//! No portable "clipboard changed" notification exists, so the detector polls.
//! Every tick it calls [`ClipboardSync::detect_change`] and pushes any new
//! content into an `mpsc` channel that the relay drains.
//!
//! The loop runs on a dedicated OS thread named `clipsync-detector` because
//! clipboard calls are blocking and some platforms (Windows `OpenClipboard`)
//! spin while another process holds the clipboard.  Keeping those calls off
//! the Tokio worker threads means a stuck clipboard never stalls socket I/O.
//!
//! # Stopping
//!
//! The sleep between ticks is cut into short slices; after each slice the
//! `running` flag is checked, so clearing the flag ends the thread within
//! [`STOP_POLL`] even with a long poll interval.  The thread also ends when
//! the receiving side of the channel is dropped.

use std::io;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use clipsync_core::ClipboardUpdate;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::sync_clipboard::{ClipboardError, ClipboardSync};

/// Default time between two clipboard reads.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound on how long a stop request goes unnoticed.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Polls the clipboard on a background thread.
pub struct ChangeDetector {
    sync: Arc<ClipboardSync>,
    interval: Duration,
}

impl ChangeDetector {
    pub fn new(sync: Arc<ClipboardSync>, interval: Duration) -> Self {
        Self { sync, interval }
    }

    /// Starts the polling thread.
    ///
    /// Detected updates are sent on `tx`.  The thread runs until `running` is
    /// cleared or `tx`'s receiver is dropped.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the OS refuses to create the thread.
    pub fn spawn(
        self,
        tx: mpsc::Sender<ClipboardUpdate>,
        running: Arc<AtomicBool>,
    ) -> io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("clipsync-detector".to_string())
            .spawn(move || self.run(tx, running))
    }

    fn run(self, tx: mpsc::Sender<ClipboardUpdate>, running: Arc<AtomicBool>) {
        info!("clipboard detector started ({:?} interval)", self.interval);

        while running.load(Ordering::Relaxed) {
            match self.sync.detect_change() {
                Ok(Some(update)) => {
                    if tx.blocking_send(update).is_err() {
                        // Receiver dropped – relay is gone.
                        break;
                    }
                }
                Ok(None) => {}
                // Another process holding the clipboard is routine.
                Err(e @ ClipboardError::Unavailable(_)) => debug!("clipboard read skipped: {e}"),
                Err(e) => warn!("clipboard read failed: {e}"),
            }
            sleep_while_running(self.interval, &running);
        }

        info!("clipboard detector stopped");
    }
}

/// Sleeps for `total`, returning early once `running` is cleared.
fn sleep_while_running(total: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + total;
    while running.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep(STOP_POLL.min(deadline - now));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
