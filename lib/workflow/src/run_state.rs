//! Run state reconstruction from events.
//!
//! The event stream is the source of truth for run state. On startup (and
//! whenever a run is not in memory) its state is rebuilt by replaying its
//! events; the runner applies each new event through the same code path.
//!
//! This module provides:
//! - `RunState`: the replayed state of a workflow run
//! - `PendingStep`: the step a run has started but not finished
//! - `RunStateBuilder`: reconstructs state from an event stream

use crate::execution::{RunEvent, RunStatus, WorkflowRun};
use crate::step::{StepHistory, StepOutcome};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

/// A step that has been started but has no outcome yet.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingStep {
    /// Activity scheduled; its result has not been recorded.
    Activity {
        step: u32,
        kind: String,
        input: JsonValue,
    },
    /// Durable timer armed.
    Timer { step: u32, fire_at: DateTime<Utc> },
    /// Waiting for a named signal until `deadline`.
    Signal {
        step: u32,
        name: String,
        deadline: DateTime<Utc>,
    },
}

impl PendingStep {
    /// The step index this pending step occupies.
    #[must_use]
    pub fn step(&self) -> u32 {
        match self {
            Self::Activity { step, .. } | Self::Timer { step, .. } | Self::Signal { step, .. } => {
                *step
            }
        }
    }

    /// Deadline of a timer or signal wait.
    #[must_use]
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Activity { .. } => None,
            Self::Timer { fire_at, .. } => Some(*fire_at),
            Self::Signal { deadline, .. } => Some(*deadline),
        }
    }
}

/// Replayed state of a workflow run.
#[derive(Debug, Clone)]
pub struct RunState {
    /// Run summary (status, result, timestamps).
    pub run: WorkflowRun,
    /// Outcomes of finished steps.
    pub history: StepHistory,
    /// The started-but-unfinished step, if any.
    pub pending: Option<PendingStep>,
}

impl RunState {
    /// Returns true if the run reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.run.status.is_terminal()
    }

    /// Returns true if the run is suspended on a timer or signal.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        matches!(
            self.pending,
            Some(PendingStep::Timer { .. } | PendingStep::Signal { .. })
        )
    }

    /// Applies one event on top of the current state.
    ///
    /// # Errors
    ///
    /// Returns an error if the event does not fit the current state.
    pub fn apply(&mut self, event: &RunEvent) -> Result<(), RunStateError> {
        if self.is_terminal() {
            return Err(RunStateError::EventAfterTerminal { event: event.name() });
        }

        match event {
            RunEvent::RunQueued { .. } => return Err(RunStateError::DuplicateRunQueued),
            RunEvent::RunStarted { .. } => {
                self.run.status = RunStatus::Running;
            }
            RunEvent::ActivityScheduled {
                step, kind, input, ..
            } => {
                self.expect_next(*step, event)?;
                self.pending = Some(PendingStep::Activity {
                    step: *step,
                    kind: kind.clone(),
                    input: input.clone(),
                });
                self.run.status = RunStatus::Running;
            }
            RunEvent::ActivityCompleted { step, result, .. } => {
                self.finish_pending(*step, event, |p| matches!(p, PendingStep::Activity { .. }))?;
                self.history
                    .push(StepOutcome::ActivityCompleted(result.clone()));
            }
            RunEvent::ActivityFailed { step, failure, .. } => {
                self.finish_pending(*step, event, |p| matches!(p, PendingStep::Activity { .. }))?;
                self.history
                    .push(StepOutcome::ActivityFailed(failure.clone()));
            }
            RunEvent::TimerStarted { step, fire_at, .. } => {
                self.expect_next(*step, event)?;
                self.pending = Some(PendingStep::Timer {
                    step: *step,
                    fire_at: *fire_at,
                });
                self.run.status = RunStatus::Waiting;
            }
            RunEvent::TimerFired { step, .. } => {
                self.finish_pending(*step, event, |p| matches!(p, PendingStep::Timer { .. }))?;
                self.history.push(StepOutcome::TimerFired);
                self.run.status = RunStatus::Running;
            }
            RunEvent::SignalWaitStarted {
                step,
                name,
                deadline,
                ..
            } => {
                self.expect_next(*step, event)?;
                self.pending = Some(PendingStep::Signal {
                    step: *step,
                    name: name.clone(),
                    deadline: *deadline,
                });
                self.run.status = RunStatus::Waiting;
            }
            RunEvent::SignalReceived {
                step,
                name,
                payload,
                ..
            } => {
                self.finish_pending(*step, event, |p| {
                    matches!(p, PendingStep::Signal { name: awaited, .. } if awaited == name)
                })?;
                self.history
                    .push(StepOutcome::SignalReceived(payload.clone()));
                self.run.status = RunStatus::Running;
            }
            RunEvent::SignalWaitTimedOut { step, name, .. } => {
                self.finish_pending(*step, event, |p| {
                    matches!(p, PendingStep::Signal { name: awaited, .. } if awaited == name)
                })?;
                self.history.push(StepOutcome::WaitTimedOut);
                self.run.status = RunStatus::Running;
            }
            RunEvent::RunCompleted { result, .. } => {
                self.pending = None;
                self.run.status = RunStatus::Completed;
                self.run.result = Some(result.clone());
            }
            RunEvent::RunFailed { error, .. } => {
                self.pending = None;
                self.run.status = RunStatus::Failed;
                self.run.error = Some(error.clone());
            }
            RunEvent::RunTimedOut { reason, .. } => {
                self.pending = None;
                self.run.status = RunStatus::TimedOut;
                self.run.error = Some(reason.clone());
            }
            RunEvent::RunCancelled { .. } => {
                self.pending = None;
                self.run.status = RunStatus::Cancelled;
            }
        }

        self.run.updated_at = event.timestamp();
        Ok(())
    }

    fn expect_next(&self, step: u32, event: &RunEvent) -> Result<(), RunStateError> {
        if let Some(pending) = &self.pending {
            return Err(RunStateError::StepStillPending {
                event: event.name(),
                pending: pending.step(),
            });
        }
        let expected = self.history.next_index();
        if step != expected {
            return Err(RunStateError::OutOfOrderStep {
                event: event.name(),
                expected,
                found: step,
            });
        }
        Ok(())
    }

    fn finish_pending(
        &mut self,
        step: u32,
        event: &RunEvent,
        fits: impl Fn(&PendingStep) -> bool,
    ) -> Result<(), RunStateError> {
        match self.pending.take() {
            Some(pending) if pending.step() == step && fits(&pending) => Ok(()),
            other => {
                self.pending = other;
                Err(RunStateError::UnexpectedEvent {
                    event: event.name(),
                    step,
                })
            }
        }
    }
}

/// Builder for reconstructing run state from events.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunStateBuilder;

impl RunStateBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Reconstructs run state from a sequence of events.
    ///
    /// Events must be provided in order (earliest first).
    ///
    /// # Errors
    ///
    /// Returns an error if the event sequence is invalid (e.g., missing RunQueued).
    pub fn build_from_events(
        &self,
        events: impl IntoIterator<Item = RunEvent>,
    ) -> Result<RunState, RunStateError> {
        let mut events_iter = events.into_iter();

        let first_event = events_iter.next().ok_or(RunStateError::NoEvents)?;
        let RunEvent::RunQueued {
            run_id,
            kind,
            user_id,
            input,
            timestamp,
        } = first_event
        else {
            return Err(RunStateError::MissingRunQueued);
        };

        let mut state = RunState {
            run: WorkflowRun {
                id: run_id,
                kind,
                user_id,
                status: RunStatus::Pending,
                created_at: timestamp,
                updated_at: timestamp,
                input,
                result: None,
                error: None,
            },
            history: StepHistory::new(),
            pending: None,
        };

        for event in events_iter {
            state.apply(&event)?;
        }

        Ok(state)
    }
}

/// Errors that can occur during run state reconstruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStateError {
    /// No events provided.
    NoEvents,
    /// First event was not RunQueued.
    MissingRunQueued,
    /// Duplicate RunQueued event.
    DuplicateRunQueued,
    /// A new step started before the previous one finished.
    StepStillPending { event: &'static str, pending: u32 },
    /// A step started with the wrong index.
    OutOfOrderStep {
        event: &'static str,
        expected: u32,
        found: u32,
    },
    /// A step outcome does not match the pending step.
    UnexpectedEvent { event: &'static str, step: u32 },
    /// An event followed a terminal event.
    EventAfterTerminal { event: &'static str },
}

impl std::fmt::Display for RunStateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoEvents => write!(f, "no events provided"),
            Self::MissingRunQueued => write!(f, "first event must be run_queued"),
            Self::DuplicateRunQueued => write!(f, "duplicate run_queued event"),
            Self::StepStillPending { event, pending } => {
                write!(f, "{event} while step {pending} is still pending")
            }
            Self::OutOfOrderStep {
                event,
                expected,
                found,
            } => write!(f, "{event} for step {found}, expected step {expected}"),
            Self::UnexpectedEvent { event, step } => {
                write!(f, "{event} does not match pending step {step}")
            }
            Self::EventAfterTerminal { event } => {
                write!(f, "{event} recorded after the run finished")
            }
        }
    }
}

impl std::error::Error for RunStateError {}
