//! ClipSyncService: wires the detector, the relay and the beacon together.
//!
//! ```text
//! start()
//!  ├─ ClipboardSync::reset()          forget the previous run's content
//!  ├─ BroadcastRelay::start(rx)       probe ports, accept peers, forward rx
//!  ├─ ChangeDetector::spawn(tx)       clipsync-detector thread
//!  └─ DiscoveryBeacon::spawn(port)    clipsync-beacon thread (optional)
//! ```
//!
//! `stop()` clears the shared `running` flag, stops the relay (which closes
//! every peer) and joins both threads.  A beacon that cannot open its socket
//! is logged and skipped; the relay keeps working for peers that connect by
//! address.

use std::io;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::application::relay_lifecycle::{LifecycleError, RelayPhase};
use crate::application::sync_clipboard::{ClipboardAccess, ClipboardSync};
use crate::infrastructure::clipboard::monitor::ChangeDetector;
use crate::infrastructure::network::discovery::{local_ip_string, BeaconConfig, DiscoveryBeacon};
use crate::infrastructure::network::relay::{BroadcastRelay, RelayConfig, RelayError};
use crate::infrastructure::storage::config::{AppConfig, ConfigError};

/// Capacity of the detector → relay channel.
const UPDATE_QUEUE: usize = 16;

/// Error type for service start.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("failed to start clipboard detector: {0}")]
    Detector(#[source] io::Error),
}

/// Everything the service needs to run.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub relay: RelayConfig,
    pub poll_interval: Duration,
    /// `None` disables the discovery beacon.
    pub beacon: Option<BeaconConfig>,
}

impl ServiceConfig {
    /// Builds the runtime configuration from the on-disk schema.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unparsable addresses.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let beacon = if config.discovery.enabled {
            Some(config.discovery.to_beacon_config()?)
        } else {
            None
        };
        Ok(Self {
            relay: config.relay.to_relay_config()?,
            poll_interval: config.detector.poll_interval(),
            beacon,
        })
    }
}

/// Point-in-time view of the service, for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    pub phase: RelayPhase,
    pub listen_port: Option<u16>,
    pub local_ip: String,
    pub peer_count: usize,
}

/// Background threads owned by one running instance.
struct Workers {
    running: Arc<AtomicBool>,
    detector: JoinHandle<()>,
    beacon: Option<JoinHandle<()>>,
}

/// The complete clipboard sync engine.
pub struct ClipSyncService {
    config: ServiceConfig,
    sync: Arc<ClipboardSync>,
    relay: BroadcastRelay,
    workers: Mutex<Option<Workers>>,
}

impl ClipSyncService {
    pub fn new(config: ServiceConfig, clipboard: Arc<dyn ClipboardAccess>) -> Self {
        let sync = Arc::new(ClipboardSync::new(clipboard));
        let relay = BroadcastRelay::new(config.relay.clone(), Arc::clone(&sync));
        Self {
            config,
            sync,
            relay,
            workers: Mutex::new(None),
        }
    }

    /// Starts the relay, the change detector and (if enabled) the beacon.
    ///
    /// Returns the bound relay port.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Lifecycle`] if the service is already running.
    /// - [`ServiceError::Relay`] if no port could be bound.
    /// - [`ServiceError::Detector`] if the detector thread could not start;
    ///   the relay is stopped again in that case.
    pub async fn start(&self) -> Result<u16, ServiceError> {
        // Checked up front so a rejected start does not reset the last-seen slot.
        let mut phase = self.relay.phase();
        phase.transition_to(RelayPhase::Starting)?;
        self.sync.reset();

        let (tx, rx) = mpsc::channel(UPDATE_QUEUE);
        let port = self.relay.start(rx).await?;

        let running = Arc::new(AtomicBool::new(true));
        let detector = ChangeDetector::new(Arc::clone(&self.sync), self.config.poll_interval);
        let detector = match detector.spawn(tx, Arc::clone(&running)) {
            Ok(handle) => handle,
            Err(e) => {
                self.relay.stop().await;
                return Err(ServiceError::Detector(e));
            }
        };

        let beacon = self.config.beacon.clone().and_then(|cfg| {
            match DiscoveryBeacon::bind(cfg).and_then(|b| b.spawn(port, Arc::clone(&running))) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!("discovery beacon disabled: {e}");
                    None
                }
            }
        });

        *self.lock_workers() = Some(Workers {
            running,
            detector,
            beacon,
        });
        info!("ClipSync running on port {port}");
        Ok(port)
    }

    /// Stops everything started by [`start`](Self::start).  Safe to call
    /// when already stopped.
    pub async fn stop(&self) {
        let workers = self.lock_workers().take();
        if let Some(workers) = &workers {
            workers.running.store(false, Ordering::Relaxed);
        }

        self.relay.stop().await;

        if let Some(workers) = workers {
            let joined = tokio::task::spawn_blocking(move || {
                let detector = workers.detector.join().is_ok();
                let beacon = workers.beacon.map_or(true, |b| b.join().is_ok());
                detector && beacon
            })
            .await;
            if !matches!(joined, Ok(true)) {
                warn!("a background thread panicked during shutdown");
            }
        }
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            phase: self.relay.phase(),
            listen_port: self.relay.bound_port(),
            local_ip: local_ip_string(),
            peer_count: self.relay.peer_count(),
        }
    }

    pub fn relay(&self) -> &BroadcastRelay {
        &self.relay
    }

    fn lock_workers(&self) -> MutexGuard<'_, Option<Workers>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
