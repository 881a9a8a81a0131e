//! Runs survive restarts and concurrent signals without repeating side effects.

mod common;

use chrono::Duration;
use common::Harness;
use flowmentor_workflow::{RunEvent, RunOutcome, RunStatus, SignalOutcome};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;

fn reflection() -> JsonValue {
    json!({
        "user_id": "demo-user",
        "date": "2024-06-03",
        "reflection_text": "Solid morning, scattered afternoon",
        "completed_blocks": 2,
        "total_blocks": 3,
        "overall_productivity": 4,
        "wins": ["Finished the outline"],
        "challenges": ["Meetings"],
    })
}

fn focus_block(duration_minutes: u32) -> JsonValue {
    json!({
        "block": {
            "block_id": "block-1",
            "user_id": "demo-user",
            "date": "2024-06-03",
            "title": "Write report",
            "duration_minutes": duration_minutes,
        }
    })
}

/// Keeps events up to and including the first one matching `stop`.
fn prefix(events: Vec<RunEvent>, stop: impl Fn(&RunEvent) -> bool) -> Vec<RunEvent> {
    let mut kept = Vec::new();
    for event in events {
        let done = stop(&event);
        kept.push(event);
        if done {
            break;
        }
    }
    kept
}

#[tokio::test]
async fn restart_inside_finished_activity_does_not_resend() {
    let first = Harness::new();
    let run_id = first.start("daily_reflection", reflection()).await;
    let original = first.completed(run_id).await;
    assert_eq!(first.notifier.sent().await.len(), 1);

    // Crash right after the notification step was scheduled; its result is
    // already in the ledger.
    let events = prefix(first.events(run_id).await, |event| {
        matches!(event, RunEvent::ActivityScheduled { step: 2, .. })
    });
    let history = Arc::new(flowmentor_workflow::InMemoryHistoryStore::seeded(events).await);
    let second = Harness::restarted(history, first.store.clone(), first.notifier.clone());

    assert_eq!(second.runner.recover().await.expect("recover"), 1);
    second.runner.wait_idle().await;

    assert_eq!(second.completed(run_id).await, original);
    assert_eq!(second.notifier.sent().await.len(), 1);
}

#[tokio::test]
async fn restart_before_activity_ran_executes_it_once() {
    let first = Harness::new();
    let run_id = first.start("daily_reflection", reflection()).await;
    first.completed(run_id).await;

    // Simulate a crash before the notification ever ran: the history stops
    // at the scheduling event and no ledger entry or delivery exists.
    let events = prefix(first.events(run_id).await, |event| {
        matches!(event, RunEvent::ActivityScheduled { step: 2, .. })
    });
    let history = Arc::new(flowmentor_workflow::InMemoryHistoryStore::seeded(events).await);
    let second = Harness::restarted(
        history,
        Arc::new(flowmentor_integration::InMemoryDocumentStore::new()),
        Arc::new(flowmentor_integration::RecordingNotifier::new()),
    );

    assert_eq!(second.runner.recover().await.expect("recover"), 1);
    second.runner.wait_idle().await;

    let result = second.completed(run_id).await;
    assert_eq!(result["notified"], true);
    assert_eq!(second.notifier.sent().await.len(), 1);
}

#[tokio::test]
async fn lost_ledger_entry_does_not_resend_notification() {
    let first = Harness::new();
    let run_id = first.start("daily_reflection", reflection()).await;
    first.completed(run_id).await;

    // The notification went out but its result never reached the ledger.
    let events = prefix(first.events(run_id).await, |event| {
        matches!(event, RunEvent::ActivityScheduled { step: 2, .. })
    });
    let history = Arc::new(flowmentor_workflow::InMemoryHistoryStore::seeded(events).await);
    let second = Harness::restarted(
        history,
        Arc::new(flowmentor_integration::InMemoryDocumentStore::new()),
        first.notifier.clone(),
    );

    assert_eq!(second.runner.recover().await.expect("recover"), 1);
    second.runner.wait_idle().await;

    assert_eq!(second.completed(run_id).await["notified"], true);
    assert_eq!(second.notifier.sent().await.len(), 1);
}

#[tokio::test]
async fn pending_timer_survives_restart() {
    let first = Harness::new();
    let run_id = first.start("focus_loop", focus_block(25)).await;
    assert_eq!(first.runner.waiting_count().await, 1);

    let history = Arc::new(
        flowmentor_workflow::InMemoryHistoryStore::seeded(first.events(run_id).await).await,
    );
    let second = Harness::restarted(history, first.store.clone(), first.notifier.clone());
    assert_eq!(second.runner.recover().await.expect("recover"), 1);
    assert_eq!(second.runner.waiting_count().await, 1);

    assert_eq!(second.advance(Duration::minutes(24)).await, 0);
    assert_eq!(second.advance(Duration::minutes(1)).await, 1);

    // Start and end notifications, each delivered once across both processes.
    assert_eq!(second.notifier.sent().await.len(), 2);
    assert_eq!(
        second.runner.describe(run_id).await.expect("run").status,
        RunStatus::Waiting
    );

    let outcome = second
        .runner
        .signal(run_id, "submit_feedback", json!("great"))
        .await
        .expect("signal");
    assert_eq!(outcome, SignalOutcome::Accepted);
    second.runner.wait_idle().await;
    assert_eq!(second.completed(run_id).await["feedback"], "great");
}

#[tokio::test]
async fn recover_skips_finished_runs() {
    let first = Harness::new();
    let run_id = first.start("daily_reflection", reflection()).await;
    first.completed(run_id).await;

    let history = Arc::new(
        flowmentor_workflow::InMemoryHistoryStore::seeded(first.events(run_id).await).await,
    );
    let second = Harness::restarted(history, first.store.clone(), first.notifier.clone());
    assert_eq!(second.runner.recover().await.expect("recover"), 0);
    assert!(matches!(second.result(run_id).await, RunOutcome::Completed(_)));
}

#[tokio::test]
async fn concurrent_signals_resume_once() {
    let harness = Harness::new();
    let run_id = harness.start("focus_loop", focus_block(25)).await;
    harness.advance(Duration::minutes(25)).await;

    let a = harness.runner.clone();
    let b = harness.runner.clone();
    let (first, second) = tokio::join!(
        a.signal(run_id, "submit_feedback", json!("great")),
        b.signal(run_id, "submit_feedback", json!("meh")),
    );
    let outcomes = [first.expect("signal"), second.expect("signal")];
    let accepted = outcomes
        .iter()
        .filter(|outcome| **outcome == SignalOutcome::Accepted)
        .count();
    assert_eq!(accepted, 1);

    harness.runner.wait_idle().await;
    let events = harness.events(run_id).await;
    let received = events
        .iter()
        .filter(|event| matches!(event, RunEvent::SignalReceived { .. }))
        .count();
    assert_eq!(received, 1);
    let feedback = harness.completed(run_id).await["feedback"].clone();
    assert!(feedback == json!("great") || feedback == json!("meh"));
}

#[tokio::test]
async fn history_steps_are_in_order() {
    let harness = Harness::new();
    let run_id = harness.start("daily_reflection", reflection()).await;
    harness.completed(run_id).await;

    let names: Vec<&str> = harness
        .events(run_id)
        .await
        .iter()
        .map(RunEvent::name)
        .collect();
    assert_eq!(
        names,
        vec![
            "run_queued",
            "run_started",
            "activity_scheduled",
            "activity_completed",
            "activity_scheduled",
            "activity_completed",
            "activity_scheduled",
            "activity_completed",
            "run_completed",
        ]
    );
}
