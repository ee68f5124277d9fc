//! Supervision of the persistent agent link: bounded, delayed reconnects.

use coldcall_core::reconnect::{supervise, LinkEvent, ReconnectionManager};
use coldcall_core::{CallError, CallState, ReconnectPolicy};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

fn policy() -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts: 5,
        delay: Duration::from_secs(3),
    }
}

struct Harness {
    events: mpsc::Sender<LinkEvent>,
    call: watch::Sender<CallState>,
    attempts: Arc<Mutex<Vec<u32>>>,
    task: tokio::task::JoinHandle<()>,
}

/// Spawn `supervise` with an action that records its attempt numbers and
/// answers from a script of per-attempt results.
fn harness(action_results: Vec<Result<(), ()>>) -> Harness {
    let (event_tx, event_rx) = mpsc::channel(16);
    let call = watch::Sender::new(CallState::Connected);
    let call_rx = call.subscribe();
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let results = Arc::new(Mutex::new(action_results));

    let task = {
        let attempts = Arc::clone(&attempts);
        tokio::spawn(async move {
            supervise(
                ReconnectionManager::new(policy()),
                event_rx,
                call_rx,
                move |attempt| {
                    let attempts = Arc::clone(&attempts);
                    let results = Arc::clone(&results);
                    async move {
                        attempts.lock().unwrap().push(attempt);
                        let next = {
                            let mut r = results.lock().unwrap();
                            if r.is_empty() { Ok(()) } else { r.remove(0) }
                        };
                        next.map_err(|_| CallError::Transport("link still down".into()))
                    }
                },
            )
            .await;
        })
    };

    Harness {
        events: event_tx,
        call,
        attempts,
        task,
    }
}

#[tokio::test(start_paused = true)]
async fn repeated_failures_stop_at_the_attempt_budget() {
    let h = harness(vec![Err(()); 7]);

    // More closes than the budget allows.
    for _ in 0..7 {
        h.events.send(LinkEvent::Closed).await.unwrap();
    }
    drop(h.events);
    h.task.await.unwrap();

    // Five attempts, flat 3s apart, then silence.
    assert_eq!(*h.attempts.lock().unwrap(), vec![1, 2, 3, 4, 5]);
}

#[tokio::test(start_paused = true)]
async fn acknowledged_reconnect_refills_the_budget() {
    let h = harness(vec![Ok(()), Ok(())]);

    h.events.send(LinkEvent::Closed).await.unwrap();
    h.events.send(LinkEvent::Established).await.unwrap();
    h.events.send(LinkEvent::Closed).await.unwrap();
    drop(h.events);
    h.task.await.unwrap();

    // Both closes scheduled attempt number one.
    assert_eq!(*h.attempts.lock().unwrap(), vec![1, 1]);
}

#[tokio::test(start_paused = true)]
async fn close_after_call_end_is_a_no_op() {
    let h = harness(vec![]);

    h.call.send(CallState::Ended).unwrap();
    h.events.send(LinkEvent::Closed).await.unwrap();
    drop(h.events);
    h.task.await.unwrap();

    assert!(h.attempts.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn call_ending_during_the_delay_cancels_the_attempt() {
    let h = harness(vec![]);

    h.events.send(LinkEvent::Closed).await.unwrap();
    // Let the supervisor start its 3s wait, then end the call under it.
    tokio::time::sleep(Duration::from_secs(1)).await;
    h.call.send(CallState::Ended).unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    drop(h.events);
    h.task.await.unwrap();

    assert!(h.attempts.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn attempts_pace_at_the_flat_interval() {
    let started = tokio::time::Instant::now();
    let h = harness(vec![Err(()), Err(())]);

    h.events.send(LinkEvent::Closed).await.unwrap();
    h.events.send(LinkEvent::Closed).await.unwrap();
    drop(h.events);
    h.task.await.unwrap();

    assert_eq!(*h.attempts.lock().unwrap(), vec![1, 2]);
    // Two flat 3s delays, nothing exponential.
    assert_eq!(started.elapsed(), Duration::from_secs(6));
}
