//! Shared setup for runner integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use flowmentor_ai::{PromptRegistry, StaticTextGenerator};
use flowmentor_core::{UserId, WorkflowRunId};
use flowmentor_integration::{InMemoryDocumentStore, RecordingNotifier};
use flowmentor_workflow::{
    ActivityExecutor, ActivityRegistry, ActivityServices, HistoryStore, InMemoryHistoryStore,
    Clock, ManualClock, RunEvent, RunOutcome, WorkflowRegistry, WorkflowRunner,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// A runner wired to in-memory services and a manual clock.
pub struct Harness {
    pub runner: WorkflowRunner,
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryDocumentStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub history: Arc<InMemoryHistoryStore>,
}

pub fn monday_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
}

pub fn user() -> UserId {
    UserId::new("demo-user").expect("user")
}

impl Harness {
    pub fn new() -> Self {
        Self::with_generator(StaticTextGenerator::sample())
    }

    pub fn with_generator(generator: StaticTextGenerator) -> Self {
        Self::assemble(
            Arc::new(InMemoryHistoryStore::new()),
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(RecordingNotifier::new()),
            generator,
        )
    }

    pub fn with_notifier(notifier: RecordingNotifier) -> Self {
        Self::assemble(
            Arc::new(InMemoryHistoryStore::new()),
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(notifier),
            StaticTextGenerator::sample(),
        )
    }

    /// A fresh process over surviving history, documents, and notifier.
    pub fn restarted(
        history: Arc<InMemoryHistoryStore>,
        store: Arc<InMemoryDocumentStore>,
        notifier: Arc<RecordingNotifier>,
    ) -> Self {
        Self::assemble(history, store, notifier, StaticTextGenerator::sample())
    }

    fn assemble(
        history: Arc<InMemoryHistoryStore>,
        store: Arc<InMemoryDocumentStore>,
        notifier: Arc<RecordingNotifier>,
        generator: StaticTextGenerator,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(monday_morning()));
        let services = ActivityServices {
            store: store.clone(),
            notifier: notifier.clone(),
            generator: Arc::new(generator),
            prompts: Arc::new(PromptRegistry::standard()),
        };
        let executor = ActivityExecutor::new(
            ActivityRegistry::standard(&services),
            store.clone(),
            clock.clone(),
        );
        let runner = WorkflowRunner::new(
            WorkflowRegistry::standard(),
            executor,
            history.clone(),
            clock.clone(),
        );
        Self {
            runner,
            clock,
            store,
            notifier,
            history,
        }
    }

    /// Starts a run and lets it advance as far as it can.
    pub async fn start(&self, kind: &str, input: JsonValue) -> WorkflowRunId {
        let run_id = self.runner.start(kind, user(), input).await.expect("start");
        self.runner.wait_idle().await;
        run_id
    }

    /// Moves the clock and fires whatever became due.
    pub async fn advance(&self, by: chrono::Duration) -> usize {
        self.clock.advance(by);
        let fired = self.runner.fire_due(self.clock.now()).await.expect("fire");
        self.runner.wait_idle().await;
        fired
    }

    pub async fn result(&self, run_id: WorkflowRunId) -> RunOutcome {
        self.runner.get_result(run_id).await.expect("result")
    }

    pub async fn completed(&self, run_id: WorkflowRunId) -> JsonValue {
        match self.result(run_id).await {
            RunOutcome::Completed(result) => result,
            other => panic!("expected completion, got {other:?}"),
        }
    }

    pub async fn events(&self, run_id: WorkflowRunId) -> Vec<RunEvent> {
        self.history.load_events(run_id).await.expect("events")
    }
}
