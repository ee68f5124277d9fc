//! One call, one session: identity and lifetime bookkeeping.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Identity and counters for a single call. Created when the call connects;
/// `ended_at` is set exactly once at termination and never changes after.
#[derive(Debug, Clone)]
pub struct CallSession {
    pub session_id: String,
    pub phone_number: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Accepted client utterances so far. Drives the turn index on agent requests.
    pub client_turns: u32,
}

impl CallSession {
    pub fn new(phone_number: impl Into<String>) -> Self {
        Self {
            session_id: format!("session_{}", Uuid::new_v4().simple()),
            phone_number: phone_number.into(),
            started_at: Utc::now(),
            ended_at: None,
            client_turns: 0,
        }
    }

    /// Count one accepted client turn and return its index (1-based).
    pub fn next_turn_index(&mut self) -> u32 {
        self.client_turns += 1;
        self.client_turns
    }

    /// Mark the call as ended. Later calls keep the first end time.
    pub fn finish(&mut self) {
        if self.ended_at.is_none() {
            self.ended_at = Some(Utc::now());
        }
    }

    /// Whole-call duration in seconds; uses the current time while still live.
    pub fn duration_secs(&self) -> i64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_seconds().max(0)
    }
}
