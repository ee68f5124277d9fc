//! End-to-end conversation flow against scripted collaborators.

use coldcall_core::{
    CallConfig, CallLeg, CallOutcome, CallPolicy, MemorySink, PlaybackDriver, RecognitionEvent,
    RecordSink, ResponseResult, ScriptedAgent, ScriptedLeg, ScriptedPlayback, ScriptedRecognizer,
    Sentiment, TurnController, TurnRole,
};
use std::sync::Arc;
use std::time::Duration;

fn config() -> CallConfig {
    CallConfig::from_json(
        r#"{"phone":"+79161234567","agent_id":"agent_test","api_key":"sk_test",
            "voice_id":"21m00Tcm4TlvDq8ikWAM"}"#,
    )
    .unwrap()
}

fn hang_up_after(leg: &Arc<ScriptedLeg>, delay: Duration) -> tokio::task::JoinHandle<()> {
    let leg = Arc::clone(leg);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        leg.disconnect();
    })
}

#[tokio::test(start_paused = true)]
async fn full_exchange_produces_a_two_turn_record() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let leg = Arc::new(ScriptedLeg::connected());
    let playback = Arc::new(ScriptedPlayback::default());
    let agent = ScriptedAgent::new([
        ResponseResult::Success("Hello".into()),
        ResponseResult::Success("Great, tell me more".into()),
    ]);
    let recognizer = ScriptedRecognizer::new([RecognitionEvent::Result {
        text: "yes".into(),
        confidence: 0.8,
    }]);

    let mut controller = TurnController::new(
        &config(),
        CallPolicy::agent(),
        Arc::new(agent),
        Arc::clone(&playback) as Arc<dyn PlaybackDriver>,
        Arc::new(recognizer),
        Arc::clone(&leg) as Arc<dyn CallLeg>,
    );

    let hangup = hang_up_after(&leg, Duration::from_secs(30));
    let record = controller.run().await;
    hangup.await.unwrap();

    // Both lines reached the caller, in order.
    assert_eq!(
        playback.spoken(),
        vec!["Hello".to_string(), "Great, tell me more".to_string()]
    );

    // Greeting is spoken but not logged; the record is the one exchange.
    assert_eq!(record.conversation_turns, 2);
    assert_eq!(record.conversation[0].role, TurnRole::Client);
    assert_eq!(record.conversation[0].text, "yes");
    assert_eq!(record.conversation[0].confidence, Some(0.8));
    assert_eq!(record.conversation[1].role, TurnRole::Agent);
    assert_eq!(record.conversation[1].text, "Great, tell me more");

    // "yes" carries none of the keyword families.
    assert_eq!(record.outcome, CallOutcome::Neutral);
    assert_eq!(record.metrics.client_turns, 1);
    assert_eq!(record.metrics.agent_turns, 1);
    assert_eq!(record.status, "completed");

    // Delivery hands the same record downstream.
    let sink = MemorySink::new();
    sink.deliver(&record).await.unwrap();
    let delivered = sink.records();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].call_id, record.call_id);
}

#[tokio::test(start_paused = true)]
async fn interested_caller_classifies_as_interested() {
    let leg = Arc::new(ScriptedLeg::connected());
    let playback = Arc::new(ScriptedPlayback::default());
    let agent = ScriptedAgent::new([
        ResponseResult::Success("Здравствуйте!".into()),
        ResponseResult::Success("Отлично, тогда расскажу подробнее.".into()),
    ]);
    let recognizer = ScriptedRecognizer::new([RecognitionEvent::Result {
        text: "да, давайте".into(),
        confidence: 0.92,
    }]);

    let mut controller = TurnController::new(
        &config(),
        CallPolicy::agent(),
        Arc::new(agent),
        Arc::clone(&playback) as Arc<dyn PlaybackDriver>,
        Arc::new(recognizer),
        Arc::clone(&leg) as Arc<dyn CallLeg>,
    );

    let hangup = hang_up_after(&leg, Duration::from_secs(30));
    let record = controller.run().await;
    hangup.await.unwrap();

    assert_eq!(record.outcome, CallOutcome::Interested);
    assert_eq!(record.metrics.sentiment, Sentiment::Positive);
}

#[tokio::test(start_paused = true)]
async fn late_agent_reply_is_discarded_for_the_fallback() {
    let leg = Arc::new(ScriptedLeg::connected());
    let playback = Arc::new(ScriptedPlayback::default());
    // The reply would arrive well past the 8s budget; the race must drop it.
    let agent = ScriptedAgent::new([
        ResponseResult::Success("Здравствуйте!".into()),
        ResponseResult::Success("слишком поздний ответ".into()),
    ])
    .with_delay(Duration::from_secs(20));

    let recognizer = ScriptedRecognizer::new([RecognitionEvent::Result {
        text: "да".into(),
        confidence: 0.9,
    }]);

    let mut controller = TurnController::new(
        &config(),
        CallPolicy::agent(),
        Arc::new(agent),
        Arc::clone(&playback) as Arc<dyn PlaybackDriver>,
        Arc::new(recognizer),
        Arc::clone(&leg) as Arc<dyn CallLeg>,
    );

    let hangup = hang_up_after(&leg, Duration::from_secs(90));
    let record = controller.run().await;
    hangup.await.unwrap();

    // The delayed greeting also fell back, so both agent lines are fallbacks.
    let agent_turns: Vec<_> = record
        .conversation
        .iter()
        .filter(|t| t.role == TurnRole::Agent)
        .collect();
    assert_eq!(agent_turns.len(), 1);
    assert_eq!(
        agent_turns[0].text,
        coldcall_core::response::LINE_TIMEOUT
    );
    assert!(!playback
        .spoken()
        .iter()
        .any(|line| line.contains("слишком поздний")));
}

#[tokio::test(start_paused = true)]
async fn streaming_policy_runs_the_same_machine() {
    let leg = Arc::new(ScriptedLeg::connected());
    let playback = Arc::new(ScriptedPlayback::default());
    let agent = ScriptedAgent::new([
        ResponseResult::Success("Приветствие".into()),
        ResponseResult::Success("Ответ".into()),
    ]);
    let recognizer = ScriptedRecognizer::new([RecognitionEvent::Result {
        text: "хорошо".into(),
        confidence: 0.7,
    }]);

    let mut controller = TurnController::new(
        &config(),
        CallPolicy::streaming(),
        Arc::new(agent),
        Arc::clone(&playback) as Arc<dyn PlaybackDriver>,
        Arc::new(recognizer),
        Arc::clone(&leg) as Arc<dyn CallLeg>,
    );

    let hangup = hang_up_after(&leg, Duration::from_secs(30));
    let record = controller.run().await;
    hangup.await.unwrap();

    assert_eq!(record.conversation_turns, 2);
    assert_eq!(record.outcome, CallOutcome::Interested);
}
