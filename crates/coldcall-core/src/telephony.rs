//! The narrow seam to the telephony platform: call state and hangup.
//!
//! Dialing and answering happen outside the core; by the time a controller
//! runs, it holds a `CallLeg` that is either about to connect or already
//! connected, and all it ever does with it is watch the state and hang up.

use async_trait::async_trait;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Dialing,
    Connected,
    /// Hangup, remote disconnect, or platform failure. Terminal.
    Ended,
}

#[async_trait]
pub trait CallLeg: Send + Sync {
    /// Watch the call state. `Ended` is reported exactly once and is final.
    fn state(&self) -> watch::Receiver<CallState>;

    /// Release the call. Idempotent; a second hangup is a no-op.
    async fn hangup(&self);
}

/// In-memory leg for tests and dry runs.
pub struct ScriptedLeg {
    tx: watch::Sender<CallState>,
}

impl ScriptedLeg {
    pub fn new(initial: CallState) -> Self {
        Self {
            tx: watch::Sender::new(initial),
        }
    }

    /// A leg that is already connected.
    pub fn connected() -> Self {
        Self::new(CallState::Connected)
    }

    pub fn connect(&self) {
        self.tx.send_if_modified(|s| {
            if *s == CallState::Dialing {
                *s = CallState::Connected;
                true
            } else {
                false
            }
        });
    }

    pub fn disconnect(&self) {
        self.tx.send_if_modified(|s| {
            if *s != CallState::Ended {
                *s = CallState::Ended;
                true
            } else {
                false
            }
        });
    }

    pub fn current(&self) -> CallState {
        *self.tx.borrow()
    }
}

#[async_trait]
impl CallLeg for ScriptedLeg {
    fn state(&self) -> watch::Receiver<CallState> {
        self.tx.subscribe()
    }

    async fn hangup(&self) {
        self.disconnect();
    }
}
