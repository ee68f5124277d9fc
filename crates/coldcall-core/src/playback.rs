//! **AudioOutputController** — one playback at a time into the call media
//! stream, with a watchdog so a hung player can never stall the call.
//!
//! The driver does the actual synthesis and streaming; this wrapper owns the
//! rules: a second concurrent play is refused, a barge-in clears buffered
//! audio and reports the turn as interrupted, and errors always hand control
//! back to the caller.

use crate::error::CallResult;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Events a playback driver reports while speaking one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Started,
    Finished,
    Error(String),
    /// The caller started talking over the playback.
    BargeIn,
}

/// How one playback ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Finished,
    /// Stopped early because the caller barged in.
    Interrupted,
    Error,
    /// Refused: another playback was already active.
    Skipped,
}

/// Speech synthesis + streaming into the call. Implementations report progress
/// on the returned channel; dropping the sender without a terminal event is
/// tolerated (the watchdog covers it).
#[async_trait]
pub trait PlaybackDriver: Send + Sync {
    /// Begin playing `text` into the call media stream.
    async fn begin(&self, text: &str) -> CallResult<mpsc::Receiver<PlayerEvent>>;

    /// Drop any buffered, not-yet-played audio. Called on barge-in.
    async fn clear_buffer(&self);
}

pub struct AudioOutputController {
    driver: Arc<dyn PlaybackDriver>,
    watchdog: Duration,
    settle_delay: Duration,
    active: AtomicBool,
}

impl AudioOutputController {
    pub fn new(driver: Arc<dyn PlaybackDriver>, watchdog: Duration, settle_delay: Duration) -> Self {
        Self {
            driver,
            watchdog,
            settle_delay,
            active: AtomicBool::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Play one line. Returns when the line has finished, errored, been
    /// interrupted, or the watchdog gave up waiting.
    pub async fn play(&self, text: &str) -> PlaybackOutcome {
        if self.active.swap(true, Ordering::SeqCst) {
            warn!("playback already active, skipping: \"{}\"", preview(text));
            return PlaybackOutcome::Skipped;
        }

        info!("🎵 speaking: \"{}\"", preview(text));
        let outcome = self.play_inner(text).await;
        self.active.store(false, Ordering::SeqCst);

        if outcome == PlaybackOutcome::Finished {
            // Let the line land before the caller is listened to again.
            tokio::time::sleep(self.settle_delay).await;
        }
        outcome
    }

    async fn play_inner(&self, text: &str) -> PlaybackOutcome {
        let mut events = match self.driver.begin(text).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!("playback failed to start: {}", e);
                return PlaybackOutcome::Error;
            }
        };

        let watchdog = tokio::time::sleep(self.watchdog);
        tokio::pin!(watchdog);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(PlayerEvent::Started) => {
                        debug!("playback started");
                    }
                    Some(PlayerEvent::Finished) => {
                        debug!("playback finished");
                        return PlaybackOutcome::Finished;
                    }
                    Some(PlayerEvent::Error(e)) => {
                        warn!("playback error: {}", e);
                        return PlaybackOutcome::Error;
                    }
                    Some(PlayerEvent::BargeIn) => {
                        info!("⚡ barge-in: clearing buffered audio");
                        self.driver.clear_buffer().await;
                        return PlaybackOutcome::Interrupted;
                    }
                    None => {
                        warn!("playback driver went away mid-line");
                        return PlaybackOutcome::Error;
                    }
                },
                _ = &mut watchdog => {
                    warn!("⏰ playback watchdog fired after {:?}, forcing completion", self.watchdog);
                    return PlaybackOutcome::Finished;
                }
            }
        }
    }
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}

/// Scripted driver for tests and dry runs. Each `begin` pops one script entry
/// and replays its events; an empty script plays instantly. `Stall` holds the
/// sender open without a terminal event so the watchdog path can be exercised.
pub struct ScriptedPlayback {
    scripts: std::sync::Mutex<std::collections::VecDeque<PlaybackScript>>,
    spoken: std::sync::Mutex<Vec<String>>,
    // Senders kept alive so a stalled line does not look like a dead driver.
    held: std::sync::Mutex<Vec<mpsc::Sender<PlayerEvent>>>,
}

#[derive(Debug, Clone)]
pub enum PlaybackScript {
    Instant,
    Events(Vec<PlayerEvent>),
    Stall,
}

impl Default for ScriptedPlayback {
    fn default() -> Self {
        Self {
            scripts: std::sync::Mutex::new(std::collections::VecDeque::new()),
            spoken: std::sync::Mutex::new(Vec::new()),
            held: std::sync::Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedPlayback {
    pub fn new(scripts: impl IntoIterator<Item = PlaybackScript>) -> Self {
        Self {
            scripts: std::sync::Mutex::new(scripts.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Every line handed to `begin`, in order.
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().expect("spoken lock").clone()
    }
}

#[async_trait]
impl PlaybackDriver for ScriptedPlayback {
    async fn begin(&self, text: &str) -> CallResult<mpsc::Receiver<PlayerEvent>> {
        self.spoken.lock().expect("spoken lock").push(text.to_string());
        let script = self
            .scripts
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(PlaybackScript::Instant);

        let (tx, rx) = mpsc::channel(8);
        match script {
            PlaybackScript::Instant => {
                let _ = tx.send(PlayerEvent::Started).await;
                let _ = tx.send(PlayerEvent::Finished).await;
            }
            PlaybackScript::Events(events) => {
                for ev in events {
                    let _ = tx.send(ev).await;
                }
            }
            PlaybackScript::Stall => {
                let _ = tx.send(PlayerEvent::Started).await;
                self.held.lock().expect("held lock").push(tx);
            }
        }
        Ok(rx)
    }

    async fn clear_buffer(&self) {}
}
