//! # coldcall-core — outbound call orchestration
//!
//! Drives a single phone call through a listen → understand → respond →
//! speak cycle against a remote conversational agent, and turns the event
//! stream into a structured call record with an outcome classification.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        TurnController                          │
//! │  ┌──────────────┐  ┌────────────────┐  ┌───────────────────┐  │
//! │  │ Recognizer   │→ │ SpeechInputGate │→ │  ResponseSource   │  │
//! │  │  (one window)│  │ (accept/repeat) │  │ (timeout race +   │  │
//! │  └──────────────┘  └────────────────┘  │  fallback lines)  │  │
//! │         ↑                              └───────────────────┘  │
//! │         │                                        ↓             │
//! │  ┌──────────────────────┐            ┌─────────────────────┐  │
//! │  │ AudioOutputController│←───────────│ ConversationRecorder│  │
//! │  │ (watchdog, barge-in) │            │ (outcome, metrics)  │  │
//! │  └──────────────────────┘            └─────────────────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//!         ReconnectionManager supervises the persistent agent
//!         link in the streaming profile, orthogonal to the cycle.
//! ```
//!
//! Telephony, recognition, synthesis, and record delivery are external
//! collaborators behind traits; scripted implementations of each ship here
//! for tests and dry runs.

pub mod config;
pub mod controller;
pub mod delivery;
pub mod error;
pub mod gate;
pub mod playback;
pub mod reconnect;
pub mod recorder;
pub mod response;
pub mod session;
pub mod telephony;

pub use config::{CallConfig, CallPolicy, ReconnectPolicy, CONFIDENCE_THRESHOLD};
pub use controller::{RecognitionEvent, Recognizer, ScriptedRecognizer, TurnController};
pub use delivery::{MemorySink, RecordSink, WebhookSink};
pub use error::{CallError, CallResult};
pub use gate::{GateDecision, SpeechInputGate};
pub use playback::{
    AudioOutputController, PlaybackDriver, PlaybackOutcome, PlaybackScript, PlayerEvent,
    ScriptedPlayback,
};
pub use reconnect::{LinkEvent, ReconnectDecision, ReconnectionManager};
pub use recorder::{
    CallMetrics, CallOutcome, CallRecord, ConversationRecorder, Engagement, Sentiment, Turn,
    TurnRole,
};
pub use response::{
    AgentBackend, AgentReply, AgentRequest, ElevenAgentClient, FallbackLines, MessageType,
    ResponseResult, ResponseSource, ScriptedAgent, DEFAULT_GREETING,
};
pub use session::CallSession;
pub use telephony::{CallLeg, CallState, ScriptedLeg};
