//! Durable workflow engine for FlowMentor.
//!
//! This crate provides:
//!
//! - **Runner**: drives runs step by step, suspends them on durable timers
//!   and signal waits, and resumes them from recorded history after a restart
//! - **Activities**: retried, idempotent execution of the side effects a
//!   workflow asks for
//! - **History**: the event-sourced record every run is rebuilt from
//! - **Workflows**: MorningCheck, FocusLoop, DailyReflection, WeeklyGrowth,
//!   and MeetingScheduler

pub mod activity;
pub mod clock;
pub mod definition;
pub mod envelope;
pub mod error;
pub mod execution;
pub mod history;
pub mod kind;
pub mod run_state;
pub mod runner;
pub mod step;
pub mod workflows;

pub use activity::{
    Activity, ActivityContext, ActivityError, ActivityExecutor, ActivityFailure, ActivityRegistry,
    ActivityServices, RetryPolicy,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use definition::{WorkflowDefinition, WorkflowRegistry};
pub use envelope::{CURRENT_VERSION, Envelope, RawEnvelope};
pub use error::{HistoryError, RunnerError};
pub use execution::{ActivityInvocation, InvocationOutcome, RunEvent, RunStatus, WorkflowRun};
pub use history::{HistoryStore, InMemoryHistoryStore};
pub use kind::{UnknownWorkflowKind, WorkflowKind};
pub use run_state::{PendingStep, RunState, RunStateBuilder, RunStateError};
pub use runner::{CancelOutcome, RunOutcome, SignalOutcome, WorkflowRunner};
pub use step::{Step, StepHistory, StepOutcome};
