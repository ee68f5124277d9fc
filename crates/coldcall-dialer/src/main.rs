//! coldcall-dialer — drive one call session from a terminal.
//!
//! The telephony platform is not part of this repository, so the dialer
//! stands in for it: your keyboard is the caller (each line is one
//! recognized utterance), the agent replies print to the terminal, and the
//! finished call record goes to the configured webhook. With `--offline`
//! the remote agent is replaced by the scripted backend, so the whole loop
//! runs without credentials or network.
//!
//! Usage: coldcall-dialer <config.json> [--streaming] [--offline]

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use coldcall_core::{
    AgentBackend, CallConfig, CallLeg, CallPolicy, CallResult, ElevenAgentClient, PlaybackDriver,
    PlayerEvent, RecognitionEvent, Recognizer, RecordSink, ScriptedAgent, ScriptedLeg,
    TurnController, WebhookSink, DEFAULT_GREETING,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Prints agent lines to the terminal and completes instantly.
struct ConsolePlayback;

#[async_trait]
impl PlaybackDriver for ConsolePlayback {
    async fn begin(&self, text: &str) -> CallResult<mpsc::Receiver<PlayerEvent>> {
        println!("🤖 {}", text);
        let (tx, rx) = mpsc::channel(4);
        let _ = tx.send(PlayerEvent::Started).await;
        let _ = tx.send(PlayerEvent::Finished).await;
        Ok(rx)
    }

    async fn clear_buffer(&self) {}
}

/// Turns stdin lines into recognition results. EOF hangs up the leg.
struct ConsoleRecognizer {
    lines: Mutex<mpsc::Receiver<String>>,
    leg: Arc<ScriptedLeg>,
}

impl ConsoleRecognizer {
    fn new(leg: Arc<ScriptedLeg>) -> Self {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            let mut reader = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
        });
        Self {
            lines: Mutex::new(rx),
            leg,
        }
    }
}

#[async_trait]
impl Recognizer for ConsoleRecognizer {
    async fn listen(&self, window: Duration) -> RecognitionEvent {
        let mut lines = self.lines.lock().await;
        match tokio::time::timeout(window, lines.recv()).await {
            Ok(Some(text)) => RecognitionEvent::Result {
                text,
                confidence: 0.95,
            },
            Ok(None) => {
                // Terminal closed: the caller hung up.
                self.leg.disconnect();
                RecognitionEvent::Timeout
            }
            Err(_) => RecognitionEvent::Timeout,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let streaming = args.iter().any(|a| a == "--streaming");
    let offline = args.iter().any(|a| a == "--offline");
    let config_path = match args.iter().find(|a| !a.starts_with("--")) {
        Some(p) => p.clone(),
        None => bail!("usage: coldcall-dialer <config.json> [--streaming] [--offline]"),
    };

    let blob = std::fs::read_to_string(&config_path)
        .with_context(|| format!("reading config blob {}", config_path))?;
    let mut config = CallConfig::from_json(&blob).context("call configuration rejected")?;

    let policy = if streaming {
        CallPolicy::streaming()
    } else {
        CallPolicy::agent()
    };
    info!(
        "☎️  dialing {} with the {} profile",
        config.phone,
        if streaming { "streaming" } else { "agent" }
    );

    let backend: Arc<dyn AgentBackend> = if offline {
        if config.greeting.is_none() {
            config.greeting = Some(DEFAULT_GREETING.to_string());
        }
        info!("offline mode: scripted agent backend, webhook delivery disabled");
        Arc::new(ScriptedAgent::new([]))
    } else {
        let client = ElevenAgentClient::new(config.agent_id.clone(), config.api_key.clone());
        // The call never starts against an unreachable or misconfigured agent.
        client
            .check_availability()
            .await
            .context("agent availability pre-check failed")?;
        Arc::new(client)
    };

    let leg = Arc::new(ScriptedLeg::connected());
    let recognizer = Arc::new(ConsoleRecognizer::new(Arc::clone(&leg)));

    let mut controller = TurnController::new(
        &config,
        policy,
        backend,
        Arc::new(ConsolePlayback),
        recognizer,
        Arc::clone(&leg) as Arc<dyn CallLeg>,
    );

    println!("[call connected] type the caller's replies; Ctrl-D hangs up");
    let record = controller.run().await;

    if offline {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        let sink = WebhookSink::new(config.webhook_url.clone());
        if let Err(e) = sink.deliver(&record).await {
            warn!("call record was not delivered: {}", e);
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }

    info!(
        "📊 outcome {:?}, {} turns, {}s",
        record.outcome, record.conversation_turns, record.duration
    );
    Ok(())
}
