//! **ReconnectionManager** — bounded, flat-interval recovery of the
//! persistent agent link used by the streaming profile.
//!
//! The decision core is synchronous and owns only counters; `supervise`
//! owns the timer and the reconnect action. Exhausting the attempt budget
//! degrades the link, it does not end the call: the conversation continues
//! without the remote side until the call naturally ends.

use crate::config::ReconnectPolicy;
use crate::error::CallResult;
use crate::telephony::CallState;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Lifecycle events of the persistent link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The service acknowledged the connection.
    Established,
    /// The link dropped without being asked to.
    Closed,
}

/// What to do about one unsolicited close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Schedule { attempt: u32, delay: Duration },
    /// An attempt is already underway; this close is ignored.
    AlreadyInProgress,
    /// Budget spent. The link stays down; the call stays up.
    Exhausted,
    /// The call is gone, nothing to reconnect for.
    CallInactive,
}

#[derive(Debug)]
pub struct ReconnectionManager {
    policy: ReconnectPolicy,
    attempts: u32,
    in_progress: bool,
}

impl ReconnectionManager {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            in_progress: false,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn connection_closed(&mut self, call_active: bool) -> ReconnectDecision {
        if !call_active {
            return ReconnectDecision::CallInactive;
        }
        if self.in_progress {
            return ReconnectDecision::AlreadyInProgress;
        }
        if self.attempts >= self.policy.max_attempts {
            return ReconnectDecision::Exhausted;
        }
        self.attempts += 1;
        self.in_progress = true;
        ReconnectDecision::Schedule {
            attempt: self.attempts,
            delay: self.policy.delay,
        }
    }

    /// The service acknowledged the link: the budget refills.
    pub fn connection_established(&mut self) {
        self.attempts = 0;
        self.in_progress = false;
    }

    /// The scheduled attempt itself failed; the next close may try again.
    pub fn attempt_failed(&mut self) {
        self.in_progress = false;
    }

    pub fn call_ended(&mut self) {
        self.in_progress = false;
    }
}

/// Drive the manager against a stream of link events. `reconnect` re-dials
/// the link; success is confirmed only by a later `Established` event, the
/// way the service acknowledges it.
///
/// Returns when the event stream closes (the link owner went away).
pub async fn supervise<F, Fut>(
    mut manager: ReconnectionManager,
    mut events: mpsc::Receiver<LinkEvent>,
    call_state: watch::Receiver<CallState>,
    reconnect: F,
) where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = CallResult<()>>,
{
    let max = manager.policy.max_attempts;
    while let Some(event) = events.recv().await {
        match event {
            LinkEvent::Established => {
                info!("🔌 agent link established");
                manager.connection_established();
            }
            LinkEvent::Closed => {
                let active = *call_state.borrow() == CallState::Connected;
                match manager.connection_closed(active) {
                    ReconnectDecision::Schedule { attempt, delay } => {
                        info!("🔄 reconnect attempt {}/{} in {:?}", attempt, max, delay);
                        tokio::time::sleep(delay).await;
                        if *call_state.borrow() != CallState::Connected {
                            debug!("call ended while waiting to reconnect");
                            manager.call_ended();
                            continue;
                        }
                        if let Err(e) = reconnect(attempt).await {
                            warn!("reconnect attempt {} failed: {}", attempt, e);
                            manager.attempt_failed();
                        }
                    }
                    ReconnectDecision::AlreadyInProgress => {
                        debug!("reconnect already in progress, ignoring close");
                    }
                    ReconnectDecision::Exhausted => {
                        warn!("reconnect budget exhausted; continuing without the agent link");
                    }
                    ReconnectDecision::CallInactive => {
                        debug!("call no longer active, skipping reconnect");
                    }
                }
            }
        }
    }
}
