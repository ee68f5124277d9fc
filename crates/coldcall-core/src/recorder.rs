//! **ConversationRecorder** — the append-only turn log and everything
//! computed from it when the call ends: outcome, engagement, sentiment,
//! key topics, and the wire-format call record.
//!
//! Outcome classification is keyword-based and first-match-wins, in the
//! precedence order interested → not-interested → maybe-later. It does not
//! handle negation: "не интересно" contains "интересно" and classifies as
//! interested. That false positive is inherited behavior, kept on purpose.

use crate::session::CallSession;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    Client,
    Agent,
}

/// One recorded utterance. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl Turn {
    pub fn client(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            role: TurnRole::Client,
            text: text.into(),
            timestamp: Utc::now(),
            confidence: Some(confidence),
        }
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Agent,
            text: text.into(),
            timestamp: Utc::now(),
            confidence: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Interested,
    NotInterested,
    MaybeLater,
    Neutral,
    NoConversation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engagement {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallMetrics {
    pub turns: usize,
    pub client_turns: usize,
    pub agent_turns: usize,
    pub engagement: Engagement,
    pub sentiment: Sentiment,
    /// Seconds per recorded turn, over the whole call.
    pub avg_response_time: f64,
    pub key_topics: Vec<String>,
}

/// The record delivered to the downstream webhook when the call ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_id: String,
    pub phone_number: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Whole-call duration, integer seconds.
    pub duration: i64,
    pub status: String,
    pub conversation: Vec<Turn>,
    pub conversation_turns: usize,
    pub agent_id: String,
    pub outcome: CallOutcome,
    pub metrics: CallMetrics,
}

const INTERESTED_KEYWORDS: &[&str] = &["интересно", "давайте", "хорошо", "да"];
const NOT_INTERESTED_KEYWORDS: &[&str] = &["не интересует", "нет", "не нужно"];
const MAYBE_LATER_KEYWORDS: &[&str] = &["позже", "не сейчас"];

const POSITIVE_KEYWORDS: &[&str] = &["интересно", "хорошо", "да", "давайте", "отлично"];
const NEGATIVE_KEYWORDS: &[&str] = &["не интересует", "нет", "не нужно", "дорого"];

const TOPIC_FAMILIES: &[(&str, &[&str])] = &[
    ("pricing", &["цена", "стоимость"]),
    ("timing", &["срок", "время"]),
    ("quality", &["качество", "надежность"]),
    ("company_info", &["компания", "о вас"]),
];

/// Append-only conversation log. Owned by the controller; nothing else writes it.
#[derive(Debug, Default)]
pub struct ConversationRecorder {
    log: Vec<Turn>,
}

impl ConversationRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: Turn) {
        self.log.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.log
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Classify the call from the last thing the client said.
    pub fn outcome(&self) -> CallOutcome {
        if self.log.is_empty() {
            return CallOutcome::NoConversation;
        }

        let last_client = self
            .log
            .iter()
            .rev()
            .find(|t| t.role == TurnRole::Client)
            .map(|t| t.text.to_lowercase())
            .unwrap_or_default();

        if contains_any(&last_client, INTERESTED_KEYWORDS) {
            CallOutcome::Interested
        } else if contains_any(&last_client, NOT_INTERESTED_KEYWORDS) {
            CallOutcome::NotInterested
        } else if contains_any(&last_client, MAYBE_LATER_KEYWORDS) {
            CallOutcome::MaybeLater
        } else {
            CallOutcome::Neutral
        }
    }

    pub fn metrics(&self, duration_secs: i64) -> CallMetrics {
        let client_turns = self.count_role(TurnRole::Client);
        let agent_turns = self.count_role(TurnRole::Agent);

        let engagement = if client_turns >= 3 {
            Engagement::High
        } else if client_turns >= 1 {
            Engagement::Medium
        } else {
            Engagement::Low
        };

        let client_text = self
            .log
            .iter()
            .filter(|t| t.role == TurnRole::Client)
            .map(|t| t.text.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");

        // Presence count per keyword, not occurrences.
        let positive = POSITIVE_KEYWORDS.iter().filter(|w| client_text.contains(*w)).count();
        let negative = NEGATIVE_KEYWORDS.iter().filter(|w| client_text.contains(*w)).count();
        let sentiment = if positive > negative {
            Sentiment::Positive
        } else if negative > positive {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        };

        CallMetrics {
            turns: self.log.len(),
            client_turns,
            agent_turns,
            engagement,
            sentiment,
            avg_response_time: duration_secs as f64 / self.log.len().max(1) as f64,
            key_topics: self.key_topics(),
        }
    }

    /// Build the final record. Pure over the log and the session.
    pub fn finalize(&self, session: &CallSession, agent_id: &str) -> CallRecord {
        let duration = session.duration_secs();
        CallRecord {
            call_id: session.session_id.clone(),
            phone_number: session.phone_number.clone(),
            start_time: session.started_at,
            end_time: session.ended_at.unwrap_or_else(Utc::now),
            duration,
            status: "completed".to_string(),
            conversation: self.log.clone(),
            conversation_turns: self.log.len(),
            agent_id: agent_id.to_string(),
            outcome: self.outcome(),
            metrics: self.metrics(duration),
        }
    }

    fn count_role(&self, role: TurnRole) -> usize {
        self.log.iter().filter(|t| t.role == role).count()
    }

    /// Topic families detected across all text, both roles.
    fn key_topics(&self) -> Vec<String> {
        let all_text = self
            .log
            .iter()
            .map(|t| t.text.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");

        TOPIC_FAMILIES
            .iter()
            .filter(|(_, words)| contains_any(&all_text, words))
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(text: &str) -> Turn {
        Turn::client(text, 0.9)
    }

    #[test]
    fn empty_log_is_no_conversation() {
        let rec = ConversationRecorder::new();
        assert_eq!(rec.outcome(), CallOutcome::NoConversation);
    }

    #[test]
    fn agreement_is_interested() {
        let mut rec = ConversationRecorder::new();
        rec.append(client("да, давайте"));
        assert_eq!(rec.outcome(), CallOutcome::Interested);
    }

    #[test]
    fn refusal_is_not_interested() {
        let mut rec = ConversationRecorder::new();
        rec.append(client("нет, не интересует"));
        assert_eq!(rec.outcome(), CallOutcome::NotInterested);
    }

    #[test]
    fn deferral_is_maybe_later() {
        let mut rec = ConversationRecorder::new();
        rec.append(client("перезвоните позже"));
        assert_eq!(rec.outcome(), CallOutcome::MaybeLater);
    }

    #[test]
    fn outcome_uses_the_last_client_turn() {
        let mut rec = ConversationRecorder::new();
        rec.append(client("да, давайте"));
        rec.append(Turn::agent("Отлично, расскажу подробнее"));
        rec.append(client("нет, не нужно"));
        assert_eq!(rec.outcome(), CallOutcome::NotInterested);
    }

    #[test]
    fn negation_false_positive_is_preserved() {
        // "не интересно" contains "интересно"; first-match-wins keeps the
        // inherited misclassification.
        let mut rec = ConversationRecorder::new();
        rec.append(client("мне это не интересно"));
        assert_eq!(rec.outcome(), CallOutcome::Interested);
    }

    #[test]
    fn sentiment_majority_and_engagement_tiers() {
        let mut rec = ConversationRecorder::new();
        rec.append(client("да, интересно"));
        rec.append(client("расскажите про сроки"));
        rec.append(client("хорошо"));
        let m = rec.metrics(60);
        // "да", "интересно", "хорошо" present; no negative keywords.
        assert_eq!(m.sentiment, Sentiment::Positive);
        assert_eq!(m.engagement, Engagement::High);
        assert_eq!(m.client_turns, 3);
    }

    #[test]
    fn sentiment_tie_is_neutral() {
        let mut rec = ConversationRecorder::new();
        rec.append(client("что-то непонятное"));
        let m = rec.metrics(10);
        assert_eq!(m.sentiment, Sentiment::Neutral);
        assert_eq!(m.engagement, Engagement::Medium);
    }

    #[test]
    fn no_client_turns_is_low_engagement() {
        let rec = ConversationRecorder::new();
        let m = rec.metrics(10);
        assert_eq!(m.engagement, Engagement::Low);
        assert_eq!(m.turns, 0);
        // Division guard: empty log still yields a finite average.
        assert_eq!(m.avg_response_time, 10.0);
    }

    #[test]
    fn topics_are_detected_across_both_roles() {
        let mut rec = ConversationRecorder::new();
        rec.append(Turn::agent("У нас лучшая цена на рынке"));
        rec.append(client("а какие сроки доставки?"));
        let topics = rec.metrics(30).key_topics;
        assert_eq!(topics, vec!["pricing".to_string(), "timing".to_string()]);
    }

    #[test]
    fn average_seconds_per_turn() {
        let mut rec = ConversationRecorder::new();
        rec.append(client("да"));
        rec.append(Turn::agent("Отлично"));
        let m = rec.metrics(90);
        assert_eq!(m.avg_response_time, 45.0);
    }

    #[test]
    fn finalize_builds_the_wire_record() {
        let mut session = CallSession::new("+79161234567");
        let mut rec = ConversationRecorder::new();
        rec.append(client("да, давайте"));
        rec.append(Turn::agent("Отлично, тогда начнем"));
        session.finish();

        let record = rec.finalize(&session, "agent_42");
        assert_eq!(record.status, "completed");
        assert_eq!(record.conversation_turns, 2);
        assert_eq!(record.outcome, CallOutcome::Interested);
        assert_eq!(record.agent_id, "agent_42");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["phone_number"], "+79161234567");
        assert_eq!(json["outcome"], "interested");
        assert_eq!(json["metrics"]["engagement"], "medium");
        assert_eq!(json["conversation"][0]["role"], "client");
        // Agent turns carry no confidence field at all.
        assert!(json["conversation"][1].get("confidence").is_none());
    }
}
