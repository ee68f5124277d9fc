//! Error types for the call orchestration core.

use thiserror::Error;

/// Result type alias for call operations
pub type CallResult<T> = Result<T, CallError>;

/// Errors that can occur while driving a call.
///
/// Only `Config`, `Auth`, and `NotFound` are terminal for a call. Every other
/// condition is absorbed where it happens: the caller hears a spoken fallback
/// line and the conversation keeps going.
#[derive(Error, Debug)]
pub enum CallError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Agent authentication failed: {0}")]
    Auth(String),

    #[error("Agent not found: {0}")]
    NotFound(String),

    #[error("Rate limited by agent service: {0}")]
    RateLimited(String),

    #[error("Network timeout: {0}")]
    Timeout(String),

    #[error("Recognition error: {0}")]
    Recognition(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Call record delivery error: {0}")]
    Delivery(String),
}

impl CallError {
    /// Whether this error ends the call instead of degrading to a fallback line.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CallError::Config(_) | CallError::Auth(_) | CallError::NotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_config_auth_not_found_are_fatal() {
        assert!(CallError::Config("missing phone".into()).is_fatal());
        assert!(CallError::Auth("bad key".into()).is_fatal());
        assert!(CallError::NotFound("agent_x".into()).is_fatal());

        assert!(!CallError::RateLimited("429".into()).is_fatal());
        assert!(!CallError::Timeout("slow".into()).is_fatal());
        assert!(!CallError::Recognition("asr".into()).is_fatal());
        assert!(!CallError::Playback("player".into()).is_fatal());
    }
}
