//! **TurnController** — the turn-taking state machine that drives one call.
//!
//! ```text
//! Idle → Greeting → Speaking → Listening → Understanding → Responding
//!                      ↑            ↑            │              │
//!                      │            └── repeat / silence        │
//!                      └────────────────────────────────────────┘
//!                                  … → Terminated
//! ```
//!
//! One primary operation is in flight at any moment — a recognition window,
//! a response fetch, or a playback — because the phase enum can only hold one
//! of them. Disconnect and the whole-call deadline race the conversation
//! itself; when either wins, the conversation future is dropped mid-await,
//! so a completion arriving after termination has nothing left to mutate.

use crate::config::{CallConfig, CallPolicy};
use crate::gate::{GateDecision, SpeechInputGate};
use crate::playback::{AudioOutputController, PlaybackDriver, PlaybackOutcome};
use crate::recorder::{CallRecord, ConversationRecorder, Turn};
use crate::response::{
    AgentBackend, MessageType, ResponseResult, ResponseSource, LINE_FAREWELL, LINE_REPEAT,
};
use crate::session::CallSession;
use crate::telephony::{CallLeg, CallState};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// One recognition window's result, errors folded in as data.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    Result { text: String, confidence: f32 },
    /// The window elapsed without usable speech.
    Timeout,
    Error(String),
}

/// The speech recognition collaborator. Holds the caller media exclusively
/// while a window is armed.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Run one bounded recognition window.
    async fn listen(&self, window: Duration) -> RecognitionEvent;
}

/// Where control goes once the current line has been spoken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterSpeech {
    Listen,
    HangUp,
}

/// Orchestration phase. Carrying the in-flight data in the variant keeps a
/// second concurrent playback or recognition window unrepresentable.
#[derive(Debug, Clone, PartialEq)]
enum TurnPhase {
    Idle,
    Greeting,
    Listening,
    Understanding { text: String, confidence: f32 },
    Responding { text: String },
    Speaking { line: String, then: AfterSpeech },
    Terminated,
}

pub struct TurnController {
    session: CallSession,
    policy: CallPolicy,
    phase: TurnPhase,
    gate: SpeechInputGate,
    recorder: ConversationRecorder,
    responses: ResponseSource,
    output: AudioOutputController,
    recognizer: Arc<dyn Recognizer>,
    leg: Arc<dyn CallLeg>,
    greeting: Option<String>,
    agent_id: String,
    /// Consecutive low-confidence results since the last accepted turn.
    repeat_prompts: u32,
}

impl TurnController {
    pub fn new(
        config: &CallConfig,
        policy: CallPolicy,
        backend: Arc<dyn AgentBackend>,
        playback: Arc<dyn PlaybackDriver>,
        recognizer: Arc<dyn Recognizer>,
        leg: Arc<dyn CallLeg>,
    ) -> Self {
        let session = CallSession::new(config.phone.clone());
        let responses = ResponseSource::new(
            backend,
            policy.response_timeout,
            session.session_id.clone(),
            config.resolved_voice_id(),
        );
        let output =
            AudioOutputController::new(playback, policy.playback_watchdog, policy.settle_delay);
        let gate = SpeechInputGate::new(policy.confidence_threshold, 1);

        Self {
            session,
            policy,
            phase: TurnPhase::Idle,
            gate,
            recorder: ConversationRecorder::new(),
            responses,
            output,
            recognizer,
            leg,
            greeting: config.greeting.clone(),
            agent_id: config.agent_id.clone(),
            repeat_prompts: 0,
        }
    }

    pub fn session(&self) -> &CallSession {
        &self.session
    }

    /// Drive the call to completion and return the finished record.
    pub async fn run(&mut self) -> CallRecord {
        info!(
            "📞 session {} for {}",
            self.session.session_id, self.session.phone_number
        );

        let state_rx = self.leg.state();
        let max_call = self.policy.max_call_duration;
        {
            let conversation = self.converse();
            tokio::pin!(conversation);
            tokio::select! {
                _ = &mut conversation => {}
                _ = disconnected(state_rx) => {
                    info!("📞 call disconnected");
                }
                _ = tokio::time::sleep(max_call) => {
                    warn!("⏰ maximum call duration reached, releasing the call");
                }
            }
        }

        self.teardown().await
    }

    async fn converse(&mut self) {
        while self.phase != TurnPhase::Terminated {
            let phase = std::mem::replace(&mut self.phase, TurnPhase::Terminated);
            self.phase = self.step(phase).await;
        }
    }

    async fn step(&mut self, phase: TurnPhase) -> TurnPhase {
        match phase {
            TurnPhase::Idle => self.await_connection().await,
            TurnPhase::Greeting => self.fetch_greeting().await,
            TurnPhase::Speaking { line, then } => self.speak(line, then).await,
            TurnPhase::Listening => self.listen().await,
            TurnPhase::Understanding { text, confidence } => self.understand(text, confidence),
            TurnPhase::Responding { text } => self.respond(text).await,
            TurnPhase::Terminated => TurnPhase::Terminated,
        }
    }

    async fn await_connection(&mut self) -> TurnPhase {
        let mut rx = self.leg.state();
        loop {
            match *rx.borrow() {
                CallState::Connected => {
                    info!("✅ call connected");
                    return TurnPhase::Greeting;
                }
                CallState::Ended => return TurnPhase::Terminated,
                CallState::Dialing => {}
            }
            if rx.changed().await.is_err() {
                return TurnPhase::Terminated;
            }
        }
    }

    async fn fetch_greeting(&mut self) -> TurnPhase {
        if let Some(line) = self.greeting.clone() {
            info!("🤖 greeting (configured): \"{}\"", preview(&line));
            return TurnPhase::Speaking {
                line,
                then: AfterSpeech::Listen,
            };
        }

        let reply = self.responses.fetch(MessageType::Greeting, "", 0).await;
        info!("🤖 greeting: \"{}\"", preview(&reply.line));
        let then = if is_fatal_tag(&reply.result) {
            error!("fatal agent error on greeting: {:?}", reply.result);
            AfterSpeech::HangUp
        } else {
            AfterSpeech::Listen
        };
        TurnPhase::Speaking { line: reply.line, then }
    }

    async fn speak(&mut self, line: String, then: AfterSpeech) -> TurnPhase {
        let outcome = self.output.play(&line).await;
        match then {
            AfterSpeech::HangUp => TurnPhase::Terminated,
            AfterSpeech::Listen => match outcome {
                PlaybackOutcome::Finished
                | PlaybackOutcome::Interrupted
                | PlaybackOutcome::Skipped => TurnPhase::Listening,
                PlaybackOutcome::Error => {
                    tokio::time::sleep(self.policy.rearm_delay).await;
                    TurnPhase::Listening
                }
            },
        }
    }

    async fn listen(&mut self) -> TurnPhase {
        match self.recognizer.listen(self.policy.recognition_timeout).await {
            RecognitionEvent::Result { text, confidence } => {
                info!("👤 caller: \"{}\" (confidence {:.2})", preview(&text), confidence);
                TurnPhase::Understanding { text, confidence }
            }
            RecognitionEvent::Error(e) => {
                warn!("recognition error, re-arming: {}", e);
                tokio::time::sleep(self.policy.recognition_retry_delay).await;
                TurnPhase::Listening
            }
            RecognitionEvent::Timeout => {
                if self.session.client_turns == 0 {
                    info!("⏰ silence on the first turn, closing the call");
                    TurnPhase::Speaking {
                        line: LINE_FAREWELL.to_string(),
                        then: AfterSpeech::HangUp,
                    }
                } else {
                    tokio::time::sleep(self.policy.rearm_delay).await;
                    TurnPhase::Listening
                }
            }
        }
    }

    fn understand(&mut self, text: String, confidence: f32) -> TurnPhase {
        match self.gate.classify(&text, confidence) {
            GateDecision::Accept(accepted) => {
                self.repeat_prompts = 0;
                self.recorder.append(Turn::client(accepted.clone(), confidence));
                self.session.next_turn_index();
                TurnPhase::Responding { text: accepted }
            }
            GateDecision::Repeat => {
                self.repeat_prompts += 1;
                let line = if self.repeat_prompts >= self.policy.max_repeat_prompts {
                    info!(
                        "steering the topic after {} unclear results",
                        self.repeat_prompts
                    );
                    self.repeat_prompts = 0;
                    self.responses.steering_line()
                } else {
                    debug!("low confidence {:.2}, asking to repeat", confidence);
                    LINE_REPEAT.to_string()
                };
                TurnPhase::Speaking {
                    line,
                    then: AfterSpeech::Listen,
                }
            }
            GateDecision::Silence => {
                debug!("empty recognition result, silent re-arm");
                TurnPhase::Listening
            }
        }
    }

    async fn respond(&mut self, text: String) -> TurnPhase {
        let turn_index = self.session.client_turns;
        let reply = self
            .responses
            .fetch(MessageType::UserInput, &text, turn_index)
            .await;
        self.recorder.append(Turn::agent(reply.line.clone()));

        let then = if is_fatal_tag(&reply.result) {
            error!(
                "fatal agent error {:?}; closing the call with an apology",
                reply.result
            );
            AfterSpeech::HangUp
        } else {
            AfterSpeech::Listen
        };
        TurnPhase::Speaking { line: reply.line, then }
    }

    async fn teardown(&mut self) -> CallRecord {
        self.phase = TurnPhase::Terminated;
        self.leg.hangup().await;
        self.session.finish();
        let record = self.recorder.finalize(&self.session, &self.agent_id);
        info!(
            "📊 call finished: {} turns, outcome {:?}, {}s",
            record.conversation_turns, record.outcome, record.duration
        );
        record
    }
}

fn is_fatal_tag(result: &ResponseResult) -> bool {
    matches!(
        result,
        ResponseResult::HttpError(401) | ResponseResult::HttpError(404)
    )
}

async fn disconnected(mut rx: watch::Receiver<CallState>) {
    loop {
        if *rx.borrow() == CallState::Ended {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}

/// Scripted recognizer for tests and dry runs: pops one event per window.
/// An exhausted script sits through the whole window and reports silence.
pub struct ScriptedRecognizer {
    events: Mutex<VecDeque<RecognitionEvent>>,
}

impl ScriptedRecognizer {
    pub fn new(events: impl IntoIterator<Item = RecognitionEvent>) -> Self {
        Self {
            events: Mutex::new(events.into_iter().collect()),
        }
    }
}

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn listen(&self, window: Duration) -> RecognitionEvent {
        let next = self.events.lock().expect("script lock").pop_front();
        match next {
            Some(event) => event,
            None => {
                tokio::time::sleep(window).await;
                RecognitionEvent::Timeout
            }
        }
    }
}
