//! Error types for the workflow crate.
//!
//! - `HistoryError`: failures reading or writing run history
//! - `RunnerError`: failures of runner operations (start, signal, cancel, ...)
//!
//! Replay failures live next to the replay code as `RunStateError`, and
//! activity failures are values handed to workflow definitions, not errors.

use crate::run_state::RunStateError;
use flowmentor_core::WorkflowRunId;
use std::fmt;

/// Errors from history store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// The store could not be reached.
    Unavailable { reason: String },
    /// A stored event could not be decoded.
    Corrupt {
        run_id: WorkflowRunId,
        reason: String,
    },
    /// A stored event was written with an envelope version this build cannot read.
    UnsupportedVersion {
        run_id: WorkflowRunId,
        version: u32,
    },
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "history store unavailable: {reason}"),
            Self::Corrupt { run_id, reason } => {
                write!(f, "corrupt history for {run_id}: {reason}")
            }
            Self::UnsupportedVersion { run_id, version } => {
                write!(f, "history for {run_id} uses unsupported version {version}")
            }
        }
    }
}

impl std::error::Error for HistoryError {}

/// Errors from runner operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
    /// No workflow definition is registered under this name.
    UnknownWorkflowKind { kind: String },
    /// No run with this ID exists.
    RunNotFound { run_id: WorkflowRunId },
    /// The history store failed.
    History(HistoryError),
    /// Recorded history could not be replayed.
    Replay {
        run_id: WorkflowRunId,
        source: RunStateError,
    },
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownWorkflowKind { kind } => write!(f, "unknown workflow kind: {kind}"),
            Self::RunNotFound { run_id } => write!(f, "run not found: {run_id}"),
            Self::History(e) => write!(f, "history error: {e}"),
            Self::Replay { run_id, source } => {
                write!(f, "cannot replay history of {run_id}: {source}")
            }
        }
    }
}

impl std::error::Error for RunnerError {}

impl From<HistoryError> for RunnerError {
    fn from(e: HistoryError) -> Self {
        Self::History(e)
    }
}
