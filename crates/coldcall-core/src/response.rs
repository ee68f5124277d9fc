//! **ResponseSource** — "what does the agent say next", with a hard timeout
//! race and a spoken fallback for every way the request can go wrong.
//!
//! The remote call races a timer; whichever settles first wins and the
//! loser is dropped with its future, so a late success can never reach the
//! conversation. Every outcome maps to a non-empty line: the call always has
//! something to say.

use crate::error::{CallError, CallResult};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, info, warn};

/// Outcome of one agent response request. Callers match every tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseResult {
    Success(String),
    Timeout,
    HttpError(u16),
    Empty,
    ParseError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Greeting,
    UserInput,
}

/// Body of the conversation request sent to the agent service.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRequest {
    pub session_id: String,
    pub message_type: MessageType,
    pub message: String,
    pub voice_id: String,
}

/// The remote conversational brain. One implementation talks HTTP; the
/// scripted one drives tests and dry runs.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// One conversation round trip. Transport failures come back as tags,
    /// never as panics: the conversation must keep going.
    async fn request(&self, req: &AgentRequest) -> ResponseResult;

    /// Pre-dial availability probe. Fatal errors here mean the call never starts.
    async fn check_availability(&self) -> CallResult<()> {
        Ok(())
    }
}

/// Voice rendering settings carried on every agent request.
pub const TTS_MODEL_ID: &str = "eleven_multilingual_v2";
pub const TTS_STABILITY: f32 = 0.5;
pub const TTS_SIMILARITY_BOOST: f32 = 0.75;

const ELEVENLABS_API_BASE: &str = "https://api.elevenlabs.io";

/// HTTP client for the ElevenLabs agent conversation API.
#[derive(Debug, Clone)]
pub struct ElevenAgentClient {
    base_url: String,
    agent_id: String,
    api_key: String,
    client: reqwest::Client,
}

impl ElevenAgentClient {
    pub fn new(agent_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_base_url(ELEVENLABS_API_BASE, agent_id, api_key)
    }

    /// Point at a non-default endpoint (tests, proxies).
    pub fn with_base_url(
        base_url: impl Into<String>,
        agent_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent_id: agent_id.into(),
            api_key: api_key.into(),
            client,
        }
    }
}

#[async_trait]
impl AgentBackend for ElevenAgentClient {
    async fn request(&self, req: &AgentRequest) -> ResponseResult {
        let url = format!("{}/v1/agent/{}/conversation", self.base_url, self.agent_id);

        let res = match self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(req)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return ResponseResult::Timeout,
            Err(e) => {
                // A dead connection degrades the same way a slow one does.
                warn!("agent request failed before a response: {}", e);
                return ResponseResult::Timeout;
            }
        };

        let status = res.status();
        if !status.is_success() {
            return ResponseResult::HttpError(status.as_u16());
        }

        let body: serde_json::Value = match res.json().await {
            Ok(v) => v,
            Err(_) => return ResponseResult::ParseError,
        };

        // Success carries a `response` or `message` string; any other 2xx shape is empty.
        match body
            .get("response")
            .or_else(|| body.get("message"))
            .and_then(|v| v.as_str())
        {
            Some(text) => ResponseResult::Success(text.to_string()),
            None => ResponseResult::Empty,
        }
    }

    async fn check_availability(&self) -> CallResult<()> {
        let url = format!("{}/v1/agent/{}", self.base_url, self.agent_id);
        let res = self
            .client
            .get(&url)
            .header("xi-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| CallError::Transport(format!("agent availability check: {}", e)))?;

        match res.status().as_u16() {
            200 => {
                info!("agent {} is available", self.agent_id);
                Ok(())
            }
            401 | 403 => Err(CallError::Auth(format!(
                "agent service rejected the API key ({})",
                res.status()
            ))),
            404 => Err(CallError::NotFound(format!("agent {}", self.agent_id))),
            other => Err(CallError::Transport(format!(
                "agent availability check returned {}",
                other
            ))),
        }
    }
}

/// Scripted backend: replies in order, optionally after a fixed delay.
/// An exhausted script answers `Empty`.
pub struct ScriptedAgent {
    replies: Mutex<VecDeque<ResponseResult>>,
    delay: Option<Duration>,
}

impl ScriptedAgent {
    pub fn new(replies: impl IntoIterator<Item = ResponseResult>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            delay: None,
        }
    }

    /// Delay every reply, e.g. to land on the losing side of the timeout race.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl AgentBackend for ScriptedAgent {
    async fn request(&self, _req: &AgentRequest) -> ResponseResult {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.replies
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(ResponseResult::Empty)
    }
}

// Spoken lines. None of these may be empty; the conversation depends on it.
pub const LINE_REPEAT: &str = "Извините, не расслышал. Можете повторить?";
pub const LINE_TIMEOUT: &str =
    "Извините, возникли технические проблемы. Давайте я перезвоню вам позже?";
pub const LINE_AUTH_ERROR: &str = "Извините, техническая ошибка аутентификации.";
pub const LINE_AGENT_NOT_FOUND: &str = "Извините, агент не найден.";
pub const LINE_RATE_LIMITED: &str = "Извините, превышен лимит запросов. Попробуйте позже.";
pub const LINE_GENERIC_ERROR: &str = "Извините, техническая ошибка. Попробуйте позже.";
pub const LINE_FAREWELL: &str = "Извините, не удалось связаться. Попробуйте позже. До свидания!";

pub const DEFAULT_GREETING: &str = "Здравствуйте! Меня зовут Анна, я звоню из компании ТРАНСТИРЕКС по логистике. У нас есть отличное предложение по оптимизации ваших поставок из Китая. Могу рассказать подробнее?";

const STEERING_LINES: &[&str] = &[
    "Понимаю. Расскажите, с какими сложностями в логистике вы сталкиваетесь сейчас?",
    "Интересно. А какой объем грузов вы обычно перевозите из Китая?",
    "Хорошо. Какие у вас основные требования к доставке?",
    "Понятно. Можете рассказать больше о вашем бизнесе?",
    "Отлично. Какие сроки доставки для вас критичны?",
];

/// Rotates through a fixed line set. Consecutive calls never repeat a line,
/// and the order is the same on every run.
#[derive(Debug, Default)]
pub struct FallbackLines {
    cursor: AtomicUsize,
}

impl FallbackLines {
    pub fn next(&self) -> &'static str {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        STEERING_LINES[i % STEERING_LINES.len()]
    }
}

/// An agent reply reduced to something speakable, with the raw tag kept for
/// the controller's fatality decision.
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub line: String,
    pub result: ResponseResult,
}

/// Asks the backend for the next line, bounded by the policy timeout, and
/// turns whatever happened into words.
pub struct ResponseSource {
    backend: std::sync::Arc<dyn AgentBackend>,
    timeout: Duration,
    fallbacks: FallbackLines,
    session_id: String,
    voice_id: String,
}

impl ResponseSource {
    pub fn new(
        backend: std::sync::Arc<dyn AgentBackend>,
        timeout: Duration,
        session_id: impl Into<String>,
        voice_id: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            timeout,
            fallbacks: FallbackLines::default(),
            session_id: session_id.into(),
            voice_id: voice_id.into(),
        }
    }

    /// One fetch. The backend future is dropped if the timer wins, so a late
    /// result cannot be applied afterwards.
    pub async fn fetch(
        &self,
        message_type: MessageType,
        user_text: &str,
        turn_index: u32,
    ) -> AgentReply {
        let req = AgentRequest {
            session_id: self.session_id.clone(),
            message_type,
            message: user_text.to_string(),
            voice_id: self.voice_id.clone(),
        };

        let result = match tokio::time::timeout(self.timeout, self.backend.request(&req)).await {
            Ok(r) => r,
            Err(_) => {
                warn!(turn_index, "agent response timed out after {:?}", self.timeout);
                ResponseResult::Timeout
            }
        };

        let line = self.line_for(&result);
        AgentReply { line, result }
    }

    /// A topic-steering line for when the caller repeatedly cannot be understood.
    pub fn steering_line(&self) -> String {
        self.fallbacks.next().to_string()
    }

    fn line_for(&self, result: &ResponseResult) -> String {
        match result {
            ResponseResult::Success(text) if !text.trim().is_empty() => text.clone(),
            ResponseResult::Success(_) | ResponseResult::Empty => {
                self.fallbacks.next().to_string()
            }
            ResponseResult::Timeout => LINE_TIMEOUT.to_string(),
            ResponseResult::HttpError(401) => {
                error!("agent authentication failed; upstream configuration is broken");
                LINE_AUTH_ERROR.to_string()
            }
            ResponseResult::HttpError(404) => {
                error!("agent id is unknown to the service; upstream configuration is broken");
                LINE_AGENT_NOT_FOUND.to_string()
            }
            ResponseResult::HttpError(429) => LINE_RATE_LIMITED.to_string(),
            ResponseResult::HttpError(code) => {
                warn!("agent service returned {}", code);
                LINE_GENERIC_ERROR.to_string()
            }
            ResponseResult::ParseError => LINE_GENERIC_ERROR.to_string(),
        }
    }
}
