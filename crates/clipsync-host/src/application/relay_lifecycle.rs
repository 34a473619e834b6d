//! Relay lifecycle state machine.
//!
//! ```text
//! Stopped  ──►  Starting  ──►  Running  ──►  Stopping  ──►  Stopped
//!                  │
//!                  └── bind failed ──► Stopped
//! ```
//!
//! - `Stopped`: no listener, no peers.  The only state `start` is accepted from.
//! - `Starting`: probing ports.  A failed probe returns straight to `Stopped`.
//! - `Running`: the accept loop, the detector and the beacon are live.
//! - `Stopping`: sockets are being closed.  Ends in `Stopped`.
//!
//! The state machine holds no sockets; [`BroadcastRelay`] drives it and
//! consults it before acting.
//!
//! [`BroadcastRelay`]: crate::infrastructure::network::relay::BroadcastRelay

use serde::Serialize;
use thiserror::Error;

/// Current phase of the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayPhase {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Error returned for a transition the state machine does not allow.
#[derive(Debug, Error, PartialEq)]
#[error("cannot move relay from {from:?} to {to:?}")]
pub struct LifecycleError {
    pub from: RelayPhase,
    pub to: RelayPhase,
}

impl RelayPhase {
    /// Returns `true` if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: RelayPhase) -> bool {
        use RelayPhase::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Stopped)
                | (Running, Stopping)
                | (Stopping, Stopped)
        )
    }

    /// Moves to `next`, or reports why that is not allowed.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] for any transition not drawn in the module
    /// diagram.
    pub fn transition_to(&mut self, next: RelayPhase) -> Result<(), LifecycleError> {
        if !self.can_transition_to(next) {
            return Err(LifecycleError {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }
}
