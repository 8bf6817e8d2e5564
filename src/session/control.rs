//! Session state machine and the handle that drives it
//!
//! ```text
//! idle -> training <-> paused
//!            |
//!            v
//!        completed
//! ```
//!
//! `stop()` returns any state to idle. The training loop only reads the state
//! at yield points, so a pause or stop never interrupts a synchronous segment.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Lifecycle state of a training session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Training,
    Paused,
    Completed,
}

/// Cloneable handle for observing and steering a session
///
/// Every clone shares one state; the loop sleeps on it while paused.
#[derive(Debug, Clone)]
pub struct SessionControl {
    state: Arc<watch::Sender<SessionState>>,
}

impl Default for SessionControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::Idle);
        Self { state: Arc::new(tx) }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn transition(&self, from: &[SessionState], to: SessionState) -> bool {
        self.state.send_if_modified(|state| {
            if from.contains(state) && *state != to {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// Halt before the next loop iteration
    ///
    /// Only valid while training; otherwise a no-op. Returns whether the
    /// state changed.
    pub fn pause(&self) -> bool {
        let changed = self.transition(&[SessionState::Training], SessionState::Paused);
        if changed {
            tracing::info!("Training paused");
        }
        changed
    }

    /// Continue a paused session; a no-op in any other state
    pub fn resume(&self) -> bool {
        let changed = self.transition(&[SessionState::Paused], SessionState::Training);
        if changed {
            tracing::info!("Training resumed");
        }
        changed
    }

    /// Return to idle from any state
    ///
    /// A running loop notices at its next yield point, discards in-flight
    /// collectors and saves the current weights.
    pub fn stop(&self) -> bool {
        let changed = self.transition(
            &[SessionState::Training, SessionState::Paused, SessionState::Completed],
            SessionState::Idle,
        );
        if changed {
            tracing::info!("Training stop requested");
        }
        changed
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == SessionState::Idle
    }

    /// Enter training from idle
    ///
    /// `TrainingSession::start` does this itself; hosts driving collectors
    /// by hand call it so they do not stop at their first yield point.
    pub fn begin(&self) -> bool {
        self.transition(&[SessionState::Idle], SessionState::Training)
    }

    pub(crate) fn complete(&self) -> bool {
        self.transition(&[SessionState::Training, SessionState::Paused], SessionState::Completed)
    }

    /// Wait until the session is not paused and return the state it left in
    pub(crate) async fn wait_while_paused(&self) -> SessionState {
        let mut rx = self.state.subscribe();
        let state = match rx.wait_for(|s| *s != SessionState::Paused).await {
            Ok(state) => *state,
            // Unreachable while `self` holds the sender
            Err(_) => SessionState::Idle,
        };
        state
    }
}
