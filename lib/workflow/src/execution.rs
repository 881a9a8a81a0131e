//! Run records and the history event model.
//!
//! History is event sourced: every state change of a run is appended as a
//! [`RunEvent`] and the run's state is rebuilt by replaying them in order
//! (see [`crate::run_state`]).

use crate::activity::ActivityFailure;
use chrono::{DateTime, Utc};
use flowmentor_core::{UserId, WorkflowRunId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// The lifecycle status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Recorded but not yet started.
    Pending,
    /// Deciding the next step or executing an activity.
    Running,
    /// Suspended on a timer or a signal.
    Waiting,
    /// Finished with a result payload.
    Completed,
    /// Finished with an error.
    Failed,
    /// Finished because a wait the workflow could not tolerate elapsed.
    TimedOut,
    /// Stopped by an external cancel request.
    Cancelled,
}

impl RunStatus {
    /// Returns true if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }

    /// Returns the snake_case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a single workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Unique identifier for this run.
    pub id: WorkflowRunId,
    /// Name of the workflow definition being executed.
    pub kind: String,
    /// The user the run belongs to.
    pub user_id: UserId,
    /// Current status.
    pub status: RunStatus,
    /// When the run was recorded.
    pub created_at: DateTime<Utc>,
    /// When the run last changed.
    pub updated_at: DateTime<Utc>,
    /// Input the run was started with.
    pub input: JsonValue,
    /// Final result (if completed).
    pub result: Option<JsonValue>,
    /// Failure or timeout reason (if failed or timed out).
    pub error: Option<String>,
}

/// Outcome of a finished activity invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvocationOutcome {
    Completed { result: JsonValue },
    Failed { failure: ActivityFailure },
}

/// Record of one activity call made on behalf of a run step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityInvocation {
    /// The run that issued the call.
    pub run_id: WorkflowRunId,
    /// Step index within the run.
    pub step: u32,
    /// Activity kind.
    pub kind: String,
    /// Input payload.
    pub input: JsonValue,
    /// Key identifying this call across retries and restarts.
    pub idempotency_key: String,
    /// Attempts made (0 if the activity never ran).
    pub attempts: u32,
    /// Success payload or typed failure.
    pub outcome: InvocationOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ActivityInvocation {
    /// Builds the idempotency key for a run step.
    #[must_use]
    pub fn idempotency_key(run_id: WorkflowRunId, step: u32) -> String {
        format!("{run_id}:{step}")
    }
}

/// Events recorded in run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// Run was recorded.
    RunQueued {
        run_id: WorkflowRunId,
        kind: String,
        user_id: UserId,
        input: JsonValue,
        timestamp: DateTime<Utc>,
    },
    /// Run began executing.
    RunStarted {
        run_id: WorkflowRunId,
        timestamp: DateTime<Utc>,
    },
    /// An activity step was decided.
    ActivityScheduled {
        run_id: WorkflowRunId,
        step: u32,
        kind: String,
        input: JsonValue,
        timestamp: DateTime<Utc>,
    },
    /// An activity step produced a result.
    ActivityCompleted {
        run_id: WorkflowRunId,
        step: u32,
        attempts: u32,
        result: JsonValue,
        timestamp: DateTime<Utc>,
    },
    /// An activity step exhausted its retries or failed permanently.
    ActivityFailed {
        run_id: WorkflowRunId,
        step: u32,
        failure: ActivityFailure,
        timestamp: DateTime<Utc>,
    },
    /// A durable timer was armed.
    TimerStarted {
        run_id: WorkflowRunId,
        step: u32,
        fire_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    /// A durable timer elapsed.
    TimerFired {
        run_id: WorkflowRunId,
        step: u32,
        timestamp: DateTime<Utc>,
    },
    /// The run began waiting for a named signal.
    SignalWaitStarted {
        run_id: WorkflowRunId,
        step: u32,
        name: String,
        deadline: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    /// The awaited signal arrived.
    SignalReceived {
        run_id: WorkflowRunId,
        step: u32,
        name: String,
        payload: JsonValue,
        timestamp: DateTime<Utc>,
    },
    /// The signal wait reached its deadline.
    SignalWaitTimedOut {
        run_id: WorkflowRunId,
        step: u32,
        name: String,
        timestamp: DateTime<Utc>,
    },
    /// Run completed with a result.
    RunCompleted {
        run_id: WorkflowRunId,
        result: JsonValue,
        timestamp: DateTime<Utc>,
    },
    /// Run failed.
    RunFailed {
        run_id: WorkflowRunId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// Run ended in the timed-out state.
    RunTimedOut {
        run_id: WorkflowRunId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// Run was cancelled.
    RunCancelled {
        run_id: WorkflowRunId,
        timestamp: DateTime<Utc>,
    },
}

impl RunEvent {
    /// Returns the run ID associated with this event.
    #[must_use]
    pub fn run_id(&self) -> WorkflowRunId {
        match self {
            Self::RunQueued { run_id, .. }
            | Self::RunStarted { run_id, .. }
            | Self::ActivityScheduled { run_id, .. }
            | Self::ActivityCompleted { run_id, .. }
            | Self::ActivityFailed { run_id, .. }
            | Self::TimerStarted { run_id, .. }
            | Self::TimerFired { run_id, .. }
            | Self::SignalWaitStarted { run_id, .. }
            | Self::SignalReceived { run_id, .. }
            | Self::SignalWaitTimedOut { run_id, .. }
            | Self::RunCompleted { run_id, .. }
            | Self::RunFailed { run_id, .. }
            | Self::RunTimedOut { run_id, .. }
            | Self::RunCancelled { run_id, .. } => *run_id,
        }
    }

    /// Returns the timestamp of this event.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::RunQueued { timestamp, .. }
            | Self::RunStarted { timestamp, .. }
            | Self::ActivityScheduled { timestamp, .. }
            | Self::ActivityCompleted { timestamp, .. }
            | Self::ActivityFailed { timestamp, .. }
            | Self::TimerStarted { timestamp, .. }
            | Self::TimerFired { timestamp, .. }
            | Self::SignalWaitStarted { timestamp, .. }
            | Self::SignalReceived { timestamp, .. }
            | Self::SignalWaitTimedOut { timestamp, .. }
            | Self::RunCompleted { timestamp, .. }
            | Self::RunFailed { timestamp, .. }
            | Self::RunTimedOut { timestamp, .. }
            | Self::RunCancelled { timestamp, .. } => *timestamp,
        }
    }

    /// Returns the snake_case event name, as written in the `type` tag.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RunQueued { .. } => "run_queued",
            Self::RunStarted { .. } => "run_started",
            Self::ActivityScheduled { .. } => "activity_scheduled",
            Self::ActivityCompleted { .. } => "activity_completed",
            Self::ActivityFailed { .. } => "activity_failed",
            Self::TimerStarted { .. } => "timer_started",
            Self::TimerFired { .. } => "timer_fired",
            Self::SignalWaitStarted { .. } => "signal_wait_started",
            Self::SignalReceived { .. } => "signal_received",
            Self::SignalWaitTimedOut { .. } => "signal_wait_timed_out",
            Self::RunCompleted { .. } => "run_completed",
            Self::RunFailed { .. } => "run_failed",
            Self::RunTimedOut { .. } => "run_timed_out",
            Self::RunCancelled { .. } => "run_cancelled",
        }
    }

    /// Returns true if this event ends the run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RunCompleted { .. }
                | Self::RunFailed { .. }
                | Self::RunTimedOut { .. }
                | Self::RunCancelled { .. }
        )
    }
}
