//! **CallConfig** — the per-call configuration blob, and **CallPolicy** — the
//! tuning knobs that distinguish the fast streaming profile from the regular
//! agent profile.
//!
//! Each call is launched with a single opaque JSON document supplying the
//! destination number, agent credentials, and the delivery URL. A missing
//! required field is fatal: the call never starts.

use crate::error::{CallError, CallResult};
use serde::Deserialize;
use std::time::Duration;

/// Default ElevenLabs voice when neither `voice_id` nor candidates are given.
pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

/// Where the finished call record goes when the blob has no `webhook_url`.
pub const DEFAULT_WEBHOOK_URL: &str = "http://localhost:8000/api/call-results";

/// Recognition results below this confidence are asked to repeat.
pub const CONFIDENCE_THRESHOLD: f32 = 0.6;

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    phone: Option<String>,
    agent_id: Option<String>,
    api_key: Option<String>,
    #[serde(default)]
    voice_id: Option<String>,
    #[serde(default)]
    candidate_voice_ids: Vec<String>,
    #[serde(default)]
    greeting: Option<String>,
    #[serde(default)]
    webhook_url: Option<String>,
}

/// Validated per-call configuration.
#[derive(Debug, Clone)]
pub struct CallConfig {
    pub phone: String,
    pub agent_id: String,
    pub api_key: String,
    pub voice_id: Option<String>,
    pub candidate_voice_ids: Vec<String>,
    /// Opening line override. When absent the agent service provides the greeting.
    pub greeting: Option<String>,
    pub webhook_url: String,
}

impl CallConfig {
    /// Parse and validate the opaque JSON blob handed to the scenario.
    pub fn from_json(blob: &str) -> CallResult<Self> {
        let raw: RawConfig = serde_json::from_str(blob)
            .map_err(|e| CallError::Config(format!("invalid config blob: {}", e)))?;

        let phone = required(raw.phone, "phone")?;
        let agent_id = required(raw.agent_id, "agent_id")?;
        let api_key = required(raw.api_key, "api_key")?;

        Ok(Self {
            phone,
            agent_id,
            api_key,
            voice_id: raw.voice_id.filter(|v| !v.trim().is_empty()),
            candidate_voice_ids: raw.candidate_voice_ids,
            greeting: raw.greeting.filter(|g| !g.trim().is_empty()),
            webhook_url: raw
                .webhook_url
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_WEBHOOK_URL.to_string()),
        })
    }

    /// Resolve the voice: explicit `voice_id`, else the first candidate, else the default.
    pub fn resolved_voice_id(&self) -> &str {
        if let Some(ref v) = self.voice_id {
            return v;
        }
        self.candidate_voice_ids
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_VOICE_ID)
    }
}

fn required(field: Option<String>, name: &str) -> CallResult<String> {
    match field {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(CallError::Config(format!("missing required field: {}", name))),
    }
}

/// Flat-interval reconnection limits for the persistent agent link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    /// Fixed delay between attempts. Flat, not exponential.
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(3),
        }
    }
}

/// Per-variant tuning for one call. Selected at construction; the controller
/// itself is identical across profiles.
#[derive(Debug, Clone)]
pub struct CallPolicy {
    /// Hard ceiling on one agent response request.
    pub response_timeout: Duration,
    /// One recognition window.
    pub recognition_timeout: Duration,
    /// Delay before re-arming recognition after an ASR error.
    pub recognition_retry_delay: Duration,
    /// Delay before re-arming recognition after a repeat prompt or silence.
    pub rearm_delay: Duration,
    /// Pause after playback finishes before the caller is listened to again.
    pub settle_delay: Duration,
    /// Force-completes a hung playback.
    pub playback_watchdog: Duration,
    pub confidence_threshold: f32,
    /// Consecutive low-confidence results before steering the topic instead
    /// of asking to repeat again.
    pub max_repeat_prompts: u32,
    /// Whole-call ceiling; the call is released when it elapses.
    pub max_call_duration: Duration,
    /// Present only for the streaming profile with a persistent agent link.
    pub reconnect: Option<ReconnectPolicy>,
}

impl CallPolicy {
    /// Regular agent-API profile: one HTTP round trip per turn.
    pub fn agent() -> Self {
        Self {
            response_timeout: Duration::from_secs(8),
            recognition_timeout: Duration::from_secs(8),
            recognition_retry_delay: Duration::from_secs(2),
            rearm_delay: Duration::from_secs(1),
            settle_delay: Duration::from_millis(500),
            playback_watchdog: Duration::from_secs(10),
            confidence_threshold: CONFIDENCE_THRESHOLD,
            max_repeat_prompts: 2,
            max_call_duration: Duration::from_secs(300),
            reconnect: None,
        }
    }

    /// Low-latency streaming profile: tighter timeouts, persistent link with
    /// bounded reconnection.
    pub fn streaming() -> Self {
        Self {
            response_timeout: Duration::from_secs(4),
            recognition_timeout: Duration::from_secs(5),
            reconnect: Some(ReconnectPolicy::default()),
            ..Self::agent()
        }
    }
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self::agent()
    }
}
