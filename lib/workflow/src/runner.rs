//! The workflow runner.
//!
//! The runner drives each run by asking its definition for the next step,
//! recording that decision in history, and acting on it:
//!
//! 1. Activities are handed to the [`ActivityExecutor`]; the outcome is
//!    recorded and the loop continues.
//! 2. Timers and signal waits are recorded with an absolute deadline and
//!    put into the wait registry. The run then holds no task until a signal
//!    arrives or [`WorkflowRunner::fire_due`] finds the deadline passed.
//! 3. Terminal steps record the final event.
//!
//! Every state change is appended to the [`HistoryStore`] before it is
//! applied in memory, so [`WorkflowRunner::recover`] can rebuild any run
//! after a restart. Activity steps are keyed by `(run_id, step)` in the
//! executor's ledger, so a step that finished before a crash is not run
//! again when the run resumes.

use crate::activity::ActivityExecutor;
use crate::clock::Clock;
use crate::definition::WorkflowRegistry;
use crate::envelope::Envelope;
use crate::error::RunnerError;
use crate::execution::{InvocationOutcome, RunEvent, RunStatus, WorkflowRun};
use crate::history::HistoryStore;
use crate::kind::WorkflowKind;
use crate::run_state::{PendingStep, RunState, RunStateBuilder};
use crate::step::Step;
use chrono::{DateTime, Utc};
use flowmentor_core::{UserId, WorkflowRunId};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::instrument;

/// Result of delivering a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// The run was waiting for this signal and resumed.
    Accepted,
    /// The run was not waiting for this signal; nothing changed.
    Ignored,
}

impl SignalOutcome {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Ignored => "ignored",
        }
    }
}

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// The run had already finished; its status is unchanged.
    AlreadyTerminal(RunStatus),
}

/// What a caller learns when asking for a run's result.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(JsonValue),
    Failed(String),
    TimedOut(String),
    Cancelled,
    /// Not finished yet.
    Pending(RunStatus),
}

impl RunOutcome {
    fn of(run: &WorkflowRun) -> Self {
        let error = || run.error.clone().unwrap_or_default();
        match run.status {
            RunStatus::Completed => Self::Completed(run.result.clone().unwrap_or(JsonValue::Null)),
            RunStatus::Failed => Self::Failed(error()),
            RunStatus::TimedOut => Self::TimedOut(error()),
            RunStatus::Cancelled => Self::Cancelled,
            status => Self::Pending(status),
        }
    }
}

#[derive(Debug)]
struct RunSlot {
    state: RunState,
    /// A driver task owns this run.
    active: bool,
}

type SharedSlot = Arc<Mutex<RunSlot>>;

struct RunnerInner {
    definitions: WorkflowRegistry,
    executor: ActivityExecutor,
    history: Arc<dyn HistoryStore>,
    clock: Arc<dyn Clock>,
    runs: Mutex<HashMap<WorkflowRunId, SharedSlot>>,
    /// Deadline of the open timer or signal wait of each waiting run.
    waits: Mutex<HashMap<WorkflowRunId, DateTime<Utc>>>,
    tasks: std::sync::Mutex<JoinSet<()>>,
}

/// Executes workflow runs durably.
///
/// Cheap to clone; clones share the same runs.
#[derive(Clone)]
pub struct WorkflowRunner {
    inner: Arc<RunnerInner>,
}

impl std::fmt::Debug for WorkflowRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRunner")
            .field("definitions", &self.inner.definitions)
            .field("executor", &self.inner.executor)
            .finish_non_exhaustive()
    }
}

impl WorkflowRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(
        definitions: WorkflowRegistry,
        executor: ActivityExecutor,
        history: Arc<dyn HistoryStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                definitions,
                executor,
                history,
                clock,
                runs: Mutex::new(HashMap::new()),
                waits: Mutex::new(HashMap::new()),
                tasks: std::sync::Mutex::new(JoinSet::new()),
            }),
        }
    }

    /// Starts a run and returns its ID without waiting for any step.
    ///
    /// `kind` may be spelled `morning_check`, `morning-check`, or
    /// `MorningCheck`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownWorkflowKind` if no definition matches, or a history
    /// error if the run could not be recorded.
    #[instrument(skip(self, user_id, input), fields(user_id = %user_id))]
    pub async fn start(
        &self,
        kind: &str,
        user_id: UserId,
        input: JsonValue,
    ) -> Result<WorkflowRunId, RunnerError> {
        let kind = self.inner.resolve_kind(kind)?;
        let run_id = WorkflowRunId::new();
        let now = self.inner.clock.now();

        let events = vec![
            RunEvent::RunQueued {
                run_id,
                kind: kind.clone(),
                user_id,
                input,
                timestamp: now,
            },
            RunEvent::RunStarted {
                run_id,
                timestamp: now,
            },
        ];
        for event in &events {
            self.inner.history.append(Envelope::new(event.clone())).await?;
        }
        let state = RunStateBuilder::new()
            .build_from_events(events)
            .map_err(|source| RunnerError::Replay { run_id, source })?;

        let slot = Arc::new(Mutex::new(RunSlot {
            state,
            active: false,
        }));
        self.inner.runs.lock().await.insert(run_id, slot.clone());

        tracing::info!(%run_id, %kind, "workflow run started");
        let mut guard = slot.lock().await;
        self.inner.resume(run_id, &mut guard);
        Ok(run_id)
    }

    /// Delivers a signal to a run.
    ///
    /// Accepted only while the run waits for a signal of this name and the
    /// wait's deadline has not passed. A signal nobody waits for is dropped,
    /// not buffered.
    ///
    /// # Errors
    ///
    /// Returns `RunNotFound` for an unknown run, or a history error.
    #[instrument(skip(self, run_id, payload), fields(run_id = %run_id))]
    pub async fn signal(
        &self,
        run_id: WorkflowRunId,
        name: &str,
        payload: JsonValue,
    ) -> Result<SignalOutcome, RunnerError> {
        let slot = self.inner.slot(run_id).await?;
        let mut guard = slot.lock().await;
        let now = self.inner.clock.now();

        let step = match &guard.state.pending {
            Some(PendingStep::Signal {
                step,
                name: awaited,
                deadline,
            }) if awaited == name && now < *deadline => *step,
            _ => {
                tracing::debug!(signal = name, status = %guard.state.run.status, "signal ignored");
                return Ok(SignalOutcome::Ignored);
            }
        };

        self.inner
            .record(
                &mut guard,
                RunEvent::SignalReceived {
                    run_id,
                    step,
                    name: name.to_string(),
                    payload,
                    timestamp: now,
                },
            )
            .await?;
        self.inner.waits.lock().await.remove(&run_id);
        tracing::info!(signal = name, step, "signal accepted");

        self.inner.resume(run_id, &mut guard);
        Ok(SignalOutcome::Accepted)
    }

    /// Returns the result of a run, or its status if it has not finished.
    ///
    /// # Errors
    ///
    /// Returns `RunNotFound` for an unknown run, or a history error.
    pub async fn get_result(&self, run_id: WorkflowRunId) -> Result<RunOutcome, RunnerError> {
        let slot = self.inner.slot(run_id).await?;
        let guard = slot.lock().await;
        Ok(RunOutcome::of(&guard.state.run))
    }

    /// Returns the run summary.
    ///
    /// # Errors
    ///
    /// Returns `RunNotFound` for an unknown run, or a history error.
    pub async fn describe(&self, run_id: WorkflowRunId) -> Result<WorkflowRun, RunnerError> {
        let slot = self.inner.slot(run_id).await?;
        let guard = slot.lock().await;
        Ok(guard.state.run.clone())
    }

    /// Cancels a run that has not finished.
    ///
    /// Any open wait is dropped; an activity still executing finishes, but
    /// its outcome is discarded.
    ///
    /// # Errors
    ///
    /// Returns `RunNotFound` for an unknown run, or a history error.
    #[instrument(skip(self, run_id), fields(run_id = %run_id))]
    pub async fn cancel(&self, run_id: WorkflowRunId) -> Result<CancelOutcome, RunnerError> {
        let slot = self.inner.slot(run_id).await?;
        let mut guard = slot.lock().await;
        if guard.state.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal(guard.state.run.status));
        }

        let event = RunEvent::RunCancelled {
            run_id,
            timestamp: self.inner.clock.now(),
        };
        self.inner.record(&mut guard, event).await?;
        tracing::info!("workflow run cancelled");
        Ok(CancelOutcome::Cancelled)
    }

    /// Resumes every run whose timer or signal deadline is at or before `now`.
    ///
    /// Returns how many waits were ended.
    ///
    /// # Errors
    ///
    /// Returns an error if a run could not be loaded or its event recorded.
    pub async fn fire_due(&self, now: DateTime<Utc>) -> Result<usize, RunnerError> {
        let due: Vec<WorkflowRunId> = {
            let waits = self.inner.waits.lock().await;
            waits
                .iter()
                .filter(|(_, deadline)| **deadline <= now)
                .map(|(run_id, _)| *run_id)
                .collect()
        };

        let mut fired = 0;
        for run_id in due {
            let slot = self.inner.slot(run_id).await?;
            let mut guard = slot.lock().await;
            let timestamp = self.inner.clock.now();

            let event = match &guard.state.pending {
                Some(PendingStep::Timer { step, fire_at }) if *fire_at <= now => {
                    RunEvent::TimerFired {
                        run_id,
                        step: *step,
                        timestamp,
                    }
                }
                Some(PendingStep::Signal {
                    step,
                    name,
                    deadline,
                }) if *deadline <= now => RunEvent::SignalWaitTimedOut {
                    run_id,
                    step: *step,
                    name: name.clone(),
                    timestamp,
                },
                _ => {
                    if !guard.state.is_waiting() {
                        self.inner.waits.lock().await.remove(&run_id);
                    }
                    continue;
                }
            };

            tracing::debug!(%run_id, event = event.name(), "wait deadline reached");
            self.inner.record(&mut guard, event).await?;
            self.inner.waits.lock().await.remove(&run_id);
            self.inner.resume(run_id, &mut guard);
            fired += 1;
        }
        Ok(fired)
    }

    /// Reloads every unfinished run from history.
    ///
    /// Waiting runs get their deadline back in the wait registry; runs that
    /// stopped between steps or inside an activity are resumed. Returns how
    /// many runs were recovered.
    ///
    /// # Errors
    ///
    /// Returns an error if history cannot be read or replayed.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> Result<usize, RunnerError> {
        let unfinished = self.inner.history.list_unfinished().await?;
        let mut recovered = 0;

        for run_id in unfinished {
            let slot = self.inner.slot(run_id).await?;
            let mut guard = slot.lock().await;
            if guard.state.is_terminal() || guard.active {
                continue;
            }

            match guard.state.pending.as_ref().and_then(PendingStep::deadline) {
                Some(deadline) => {
                    self.inner.waits.lock().await.insert(run_id, deadline);
                }
                None => self.inner.resume(run_id, &mut guard),
            }
            recovered += 1;
        }

        tracing::info!(recovered, "recovered unfinished workflow runs");
        Ok(recovered)
    }

    /// Calls [`Self::fire_due`] every `interval` until `shutdown` completes.
    pub async fn run_timer_loop(
        &self,
        interval: std::time::Duration,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("timer loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    match self.fire_due(self.inner.clock.now()).await {
                        Ok(0) => {}
                        Ok(fired) => tracing::debug!(fired, "fired due waits"),
                        Err(e) => tracing::warn!(error = %e, "firing due waits failed"),
                    }
                }
            }
        }
    }

    /// Waits until no run is being advanced.
    ///
    /// Runs suspended on a timer or signal do not count as busy.
    pub async fn wait_idle(&self) {
        loop {
            let mut tasks = std::mem::take(
                &mut *self
                    .inner
                    .tasks
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
            if tasks.is_empty() {
                return;
            }
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "workflow driver task panicked");
                }
            }
        }
    }

    /// Number of runs with an open timer or signal wait.
    pub async fn waiting_count(&self) -> usize {
        self.inner.waits.lock().await.len()
    }
}

impl RunnerInner {
    fn resolve_kind(&self, kind: &str) -> Result<String, RunnerError> {
        if self.definitions.get(kind).is_some() {
            return Ok(kind.to_string());
        }
        kind.parse::<WorkflowKind>()
            .ok()
            .map(|parsed| parsed.as_str())
            .filter(|name| self.definitions.get(name).is_some())
            .map(ToString::to_string)
            .ok_or_else(|| RunnerError::UnknownWorkflowKind {
                kind: kind.to_string(),
            })
    }

    /// Returns the in-memory slot of a run, loading it from history if needed.
    async fn slot(&self, run_id: WorkflowRunId) -> Result<SharedSlot, RunnerError> {
        if let Some(slot) = self.runs.lock().await.get(&run_id) {
            return Ok(slot.clone());
        }

        // History is read without the map lock so other runs are not held up.
        let events = self.history.load_events(run_id).await?;
        if events.is_empty() {
            return Err(RunnerError::RunNotFound { run_id });
        }
        let state = RunStateBuilder::new()
            .build_from_events(events)
            .map_err(|source| RunnerError::Replay { run_id, source })?;

        let terminal = state.is_terminal();
        let slot = Arc::new(Mutex::new(RunSlot {
            state,
            active: false,
        }));
        if terminal {
            return Ok(slot);
        }
        Ok(self.runs.lock().await.entry(run_id).or_insert(slot).clone())
    }

    /// Appends an event to history, then applies it to the run.
    ///
    /// A finished run is dropped from the live map; later reads rebuild it
    /// from history.
    async fn record(&self, slot: &mut RunSlot, event: RunEvent) -> Result<(), RunnerError> {
        let run_id = event.run_id();
        self.history.append(Envelope::new(event.clone())).await?;
        slot.state
            .apply(&event)
            .map_err(|source| RunnerError::Replay { run_id, source })?;

        if event.is_terminal() {
            self.runs.lock().await.remove(&run_id);
            self.waits.lock().await.remove(&run_id);
            tracing::info!(%run_id, status = %slot.state.run.status, "workflow run finished");
        }
        Ok(())
    }

    /// Spawns a driver for the run unless one is already running.
    ///
    /// Must be called with the run's lock held.
    fn resume(self: &Arc<Self>, run_id: WorkflowRunId, slot: &mut RunSlot) {
        if slot.active || slot.state.is_terminal() {
            return;
        }
        slot.active = true;

        let inner = Arc::clone(self);
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            if let Err(e) = inner.drive(run_id).await {
                tracing::error!(%run_id, error = %e, "workflow driver stopped");
                if let Ok(slot) = inner.slot(run_id).await {
                    slot.lock().await.active = false;
                }
            }
        });
    }

    /// Advances a run until it waits or finishes.
    async fn drive(&self, run_id: WorkflowRunId) -> Result<(), RunnerError> {
        let slot = self.slot(run_id).await?;
        loop {
            let mut guard = slot.lock().await;
            if guard.state.is_terminal() {
                guard.active = false;
                return Ok(());
            }

            match guard.state.pending.clone() {
                Some(PendingStep::Activity { step, kind, input }) => {
                    drop(guard);
                    let invocation = self.executor.invoke(run_id, step, &kind, input).await;

                    let mut guard = slot.lock().await;
                    if guard.state.is_terminal() {
                        tracing::info!(%run_id, step, "run finished while activity ran, outcome discarded");
                        guard.active = false;
                        return Ok(());
                    }
                    let timestamp = self.clock.now();
                    let event = match invocation.outcome {
                        InvocationOutcome::Completed { result } => RunEvent::ActivityCompleted {
                            run_id,
                            step,
                            attempts: invocation.attempts,
                            result,
                            timestamp,
                        },
                        InvocationOutcome::Failed { failure } => {
                            tracing::warn!(%run_id, step, %failure, "activity step failed");
                            RunEvent::ActivityFailed {
                                run_id,
                                step,
                                failure,
                                timestamp,
                            }
                        }
                    };
                    self.record(&mut guard, event).await?;
                }
                Some(PendingStep::Timer { fire_at: deadline, .. } | PendingStep::Signal { deadline, .. }) => {
                    self.waits.lock().await.insert(run_id, deadline);
                    guard.active = false;
                    return Ok(());
                }
                None => {
                    if self.decide(run_id, &mut guard).await? {
                        guard.active = false;
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Asks the definition for the next step and records it.
    ///
    /// Returns true if the run is now suspended or finished.
    async fn decide(&self, run_id: WorkflowRunId, slot: &mut RunSlot) -> Result<bool, RunnerError> {
        let Some(definition) = self.definitions.get(&slot.state.run.kind).cloned() else {
            let error = format!("no workflow definition for kind '{}'", slot.state.run.kind);
            let event = RunEvent::RunFailed {
                run_id,
                error,
                timestamp: self.clock.now(),
            };
            self.record(slot, event).await?;
            return Ok(true);
        };

        let index = slot.state.history.next_index();
        let now = self.clock.now();
        let step = definition.next_step(&slot.state.run.input, &slot.state.history);
        tracing::debug!(%run_id, step = index, decision = ?step, "next step");

        let event = match step {
            Step::Activity { kind, input } => RunEvent::ActivityScheduled {
                run_id,
                step: index,
                kind,
                input,
                timestamp: now,
            },
            Step::Timer { duration } => match now.checked_add_signed(duration) {
                Some(fire_at) => RunEvent::TimerStarted {
                    run_id,
                    step: index,
                    fire_at,
                    timestamp: now,
                },
                None => RunEvent::RunFailed {
                    run_id,
                    error: format!("timer of {duration} overflows the calendar"),
                    timestamp: now,
                },
            },
            Step::WaitForSignal { name, timeout } => match now.checked_add_signed(timeout) {
                Some(deadline) => RunEvent::SignalWaitStarted {
                    run_id,
                    step: index,
                    name,
                    deadline,
                    timestamp: now,
                },
                None => RunEvent::RunFailed {
                    run_id,
                    error: format!("signal timeout of {timeout} overflows the calendar"),
                    timestamp: now,
                },
            },
            Step::Complete { result } => RunEvent::RunCompleted {
                run_id,
                result,
                timestamp: now,
            },
            Step::Fail { reason } => RunEvent::RunFailed {
                run_id,
                error: reason,
                timestamp: now,
            },
            Step::TimeOut { reason } => RunEvent::RunTimedOut {
                run_id,
                reason,
                timestamp: now,
            },
        };

        let suspends = !matches!(event, RunEvent::ActivityScheduled { .. });
        self.record(slot, event).await?;
        if let Some(deadline) = slot.state.pending.as_ref().and_then(PendingStep::deadline) {
            self.waits.lock().await.insert(run_id, deadline);
        }
        Ok(suspends)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{
        Activity, ActivityContext, ActivityError, ActivityRegistry, ActivityServices,
    };
    use crate::clock::ManualClock;
    use crate::definition::WorkflowDefinition;
    use crate::history::InMemoryHistoryStore;
    use crate::step::StepHistory;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use flowmentor_ai::{PromptRegistry, StaticTextGenerator};
    use flowmentor_integration::{InMemoryDocumentStore, RecordingNotifier};
    use serde_json::json;
    use tokio::sync::Notify;

    /// Waits for a signal once, then times out or completes.
    struct Approval;

    impl WorkflowDefinition for Approval {
        fn kind(&self) -> &str {
            "approval"
        }

        fn next_step(&self, _input: &JsonValue, history: &StepHistory) -> Step {
            match history.len() {
                0 => Step::wait_for_signal("approve", Duration::minutes(5)),
                _ => match history.signal_payload(0) {
                    Some(payload) => Step::Complete {
                        result: payload.clone(),
                    },
                    None => Step::TimeOut {
                        reason: "nobody approved".to_string(),
                    },
                },
            }
        }
    }

    /// Activity that blocks until released.
    #[derive(Default)]
    struct Gate {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Activity for Gate {
        fn kind(&self) -> &'static str {
            "gate"
        }

        async fn execute(
            &self,
            _ctx: &ActivityContext,
            _input: JsonValue,
        ) -> Result<JsonValue, ActivityError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(json!("opened"))
        }
    }

    /// Runs the gate activity once, then completes.
    struct Gated;

    impl WorkflowDefinition for Gated {
        fn kind(&self) -> &str {
            "gated"
        }

        fn next_step(&self, _input: &JsonValue, history: &StepHistory) -> Step {
            match history.len() {
                0 => Step::activity("gate", &json!({})),
                _ => Step::complete(&"done"),
            }
        }
    }

    fn gated_runner(gate: Arc<Gate>) -> (WorkflowRunner, Arc<InMemoryHistoryStore>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap(),
        ));
        let mut activities = ActivityRegistry::new();
        activities.register(gate);
        let executor = ActivityExecutor::new(
            activities,
            Arc::new(InMemoryDocumentStore::new()),
            clock.clone(),
        );
        let mut definitions = WorkflowRegistry::new();
        definitions.register(Arc::new(Gated));
        let history = Arc::new(InMemoryHistoryStore::new());
        let runner = WorkflowRunner::new(definitions, executor, history.clone(), clock);
        (runner, history)
    }

    fn runner() -> (WorkflowRunner, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap(),
        ));
        let store = Arc::new(InMemoryDocumentStore::new());
        let services = ActivityServices {
            store: store.clone(),
            notifier: Arc::new(RecordingNotifier::new()),
            generator: Arc::new(StaticTextGenerator::sample()),
            prompts: Arc::new(PromptRegistry::standard()),
        };
        let executor =
            ActivityExecutor::new(ActivityRegistry::standard(&services), store, clock.clone());
        let mut definitions = WorkflowRegistry::standard();
        definitions.register(Arc::new(Approval));
        let runner = WorkflowRunner::new(
            definitions,
            executor,
            Arc::new(InMemoryHistoryStore::new()),
            clock.clone(),
        );
        (runner, clock)
    }

    fn user() -> UserId {
        UserId::new("demo-user").expect("user")
    }

    #[tokio::test]
    async fn unknown_kind_is_rejected() {
        let (runner, _) = runner();
        let err = runner.start("lunch", user(), json!({})).await.unwrap_err();
        assert_eq!(
            err,
            RunnerError::UnknownWorkflowKind {
                kind: "lunch".to_string()
            }
        );
    }

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let (runner, _) = runner();
        let run_id = WorkflowRunId::new();
        assert_eq!(
            runner.get_result(run_id).await.unwrap_err(),
            RunnerError::RunNotFound { run_id }
        );
    }

    #[tokio::test]
    async fn accepted_signal_completes_run() {
        let (runner, _) = runner();
        let run_id = runner.start("approval", user(), json!({})).await.expect("start");
        runner.wait_idle().await;
        assert_eq!(
            runner.get_result(run_id).await.expect("result"),
            RunOutcome::Pending(RunStatus::Waiting)
        );

        let outcome = runner.signal(run_id, "approve", json!("yes")).await.expect("signal");
        assert_eq!(outcome, SignalOutcome::Accepted);
        runner.wait_idle().await;

        assert_eq!(
            runner.get_result(run_id).await.expect("result"),
            RunOutcome::Completed(json!("yes"))
        );
        assert_eq!(runner.waiting_count().await, 0);
    }

    #[tokio::test]
    async fn wrong_signal_name_is_ignored() {
        let (runner, _) = runner();
        let run_id = runner.start("approval", user(), json!({})).await.expect("start");
        runner.wait_idle().await;

        let outcome = runner.signal(run_id, "reject", json!(null)).await.expect("signal");
        assert_eq!(outcome, SignalOutcome::Ignored);
        assert_eq!(
            runner.describe(run_id).await.expect("run").status,
            RunStatus::Waiting
        );
    }

    #[tokio::test]
    async fn deadline_times_out_run() {
        let (runner, clock) = runner();
        let run_id = runner.start("approval", user(), json!({})).await.expect("start");
        runner.wait_idle().await;

        clock.advance(Duration::minutes(4));
        assert_eq!(runner.fire_due(clock.now()).await.expect("fire"), 0);

        clock.advance(Duration::minutes(1));
        assert_eq!(runner.fire_due(clock.now()).await.expect("fire"), 1);
        runner.wait_idle().await;

        assert_eq!(
            runner.get_result(run_id).await.expect("result"),
            RunOutcome::TimedOut("nobody approved".to_string())
        );
    }

    #[tokio::test]
    async fn signal_after_deadline_is_ignored() {
        let (runner, clock) = runner();
        let run_id = runner.start("approval", user(), json!({})).await.expect("start");
        runner.wait_idle().await;

        clock.advance(Duration::minutes(5));
        let outcome = runner.signal(run_id, "approve", json!("late")).await.expect("signal");
        assert_eq!(outcome, SignalOutcome::Ignored);
    }

    #[tokio::test]
    async fn cancel_clears_wait() {
        let (runner, _) = runner();
        let run_id = runner.start("approval", user(), json!({})).await.expect("start");
        runner.wait_idle().await;

        assert_eq!(runner.cancel(run_id).await.expect("cancel"), CancelOutcome::Cancelled);
        assert_eq!(runner.waiting_count().await, 0);
        assert_eq!(
            runner.cancel(run_id).await.expect("cancel"),
            CancelOutcome::AlreadyTerminal(RunStatus::Cancelled)
        );
        assert_eq!(
            runner.signal(run_id, "approve", json!("yes")).await.expect("signal"),
            SignalOutcome::Ignored
        );
        assert_eq!(
            runner.get_result(run_id).await.expect("result"),
            RunOutcome::Cancelled
        );
    }

    #[tokio::test]
    async fn kind_spellings_resolve() {
        let (runner, _) = runner();
        let run_id = runner
            .start(
                "MeetingScheduler",
                user(),
                json!({
                    "meeting_id": "m-1",
                    "user1_id": "ana",
                    "user2_id": "bo",
                    "user1_time_windows": [],
                    "user2_time_windows": [],
                    "meeting_duration_minutes": 30,
                    "meeting_title": "Sync",
                }),
            )
            .await
            .expect("start");
        runner.wait_idle().await;

        let run = runner.describe(run_id).await.expect("run");
        assert_eq!(run.kind, "meeting_scheduler");
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.result.expect("result")["success"], false);
    }

    #[tokio::test]
    async fn finished_runs_leave_the_live_map() {
        let (runner, _) = runner();
        let completed = runner.start("approval", user(), json!({})).await.expect("start");
        let cancelled = runner.start("approval", user(), json!({})).await.expect("start");
        let waiting = runner.start("approval", user(), json!({})).await.expect("start");
        runner.wait_idle().await;
        assert_eq!(runner.inner.runs.lock().await.len(), 3);

        runner.signal(completed, "approve", json!("yes")).await.expect("signal");
        runner.cancel(cancelled).await.expect("cancel");
        runner.wait_idle().await;

        let live = runner.inner.runs.lock().await.keys().copied().collect::<Vec<_>>();
        assert_eq!(live, vec![waiting]);

        // Finished runs are still served from history and are not cached again.
        assert_eq!(
            runner.get_result(completed).await.expect("result"),
            RunOutcome::Completed(json!("yes"))
        );
        assert_eq!(
            runner.describe(cancelled).await.expect("run").status,
            RunStatus::Cancelled
        );
        assert_eq!(runner.inner.runs.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn cancel_during_activity_discards_its_outcome() {
        let gate = Arc::new(Gate::default());
        let (runner, history) = gated_runner(gate.clone());
        let run_id = runner.start("gated", user(), json!({})).await.expect("start");
        gate.entered.notified().await;

        assert_eq!(runner.cancel(run_id).await.expect("cancel"), CancelOutcome::Cancelled);
        gate.release.notify_one();
        runner.wait_idle().await;

        assert_eq!(
            runner.get_result(run_id).await.expect("result"),
            RunOutcome::Cancelled
        );
        let events = history.load_events(run_id).await.expect("events");
        assert!(matches!(events.last(), Some(RunEvent::RunCancelled { .. })));
        assert!(
            !events
                .iter()
                .any(|event| matches!(event, RunEvent::ActivityCompleted { .. }))
        );
    }
}
