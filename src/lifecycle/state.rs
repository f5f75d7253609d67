//! Server lifecycle state.
//!
//! ```text
//! Created → Listening → Serving → Terminated
//! ```
//!
//! Transitions only move forward. Observers hold a `watch::Receiver` and can
//! wait for a particular state.

use std::fmt;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServerState {
    /// Options resolved, nothing bound yet.
    Created,
    /// Socket bound (and certificate issued when secure).
    Listening,
    /// Accept loop running.
    Serving,
    /// Accept loop finished; listener released.
    Terminated,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerState::Created => "created",
            ServerState::Listening => "listening",
            ServerState::Serving => "serving",
            ServerState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Publishes state transitions.
#[derive(Debug)]
pub struct StateTracker {
    tx: watch::Sender<ServerState>,
}

impl StateTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ServerState::Created);
        Self { tx }
    }

    pub fn current(&self) -> ServerState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.tx.subscribe()
    }

    /// Move to `next` if it is later than the current state.
    pub fn advance(&self, next: ServerState) {
        let moved = self.tx.send_if_modified(|state| {
            if next > *state {
                *state = next;
                true
            } else {
                false
            }
        });
        if moved {
            tracing::debug!(state = %next, "Server state changed");
        }
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}
