//! **SpeechInputGate** — decides what a raw recognition result becomes:
//! an accepted utterance, a request to repeat, or silence.
//!
//! Pure classification, no side effects. The controller owns what happens
//! next; the gate only looks at text and confidence.

use crate::config::CONFIDENCE_THRESHOLD;

/// What to do with one recognition result.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Confident, non-empty speech. Carries the trimmed text.
    Accept(String),
    /// The caller said something, but we are not sure what.
    Repeat,
    /// Nothing usable was said; re-arm listening without a prompt.
    Silence,
}

#[derive(Debug, Clone)]
pub struct SpeechInputGate {
    threshold: f32,
    /// Trimmed results shorter than this count as silence regardless of confidence.
    min_chars: usize,
}

impl Default for SpeechInputGate {
    fn default() -> Self {
        Self {
            threshold: CONFIDENCE_THRESHOLD,
            min_chars: 1,
        }
    }
}

impl SpeechInputGate {
    pub fn new(threshold: f32, min_chars: usize) -> Self {
        Self { threshold, min_chars }
    }

    pub fn classify(&self, text: &str, confidence: f32) -> GateDecision {
        let trimmed = text.trim();
        if trimmed.chars().count() < self.min_chars {
            return GateDecision::Silence;
        }
        if confidence >= self.threshold {
            GateDecision::Accept(trimmed.to_string())
        } else {
            GateDecision::Repeat
        }
    }
}
