//! Error types for the scheduler crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `ScheduleError`: cron expressions that cannot be parsed
//! - `TriggerError`: trigger configuration and firing ledger failures
//! - `SchedulerError`: what a tick reports upward

use flowmentor_core::UserId;
use flowmentor_workflow::WorkflowKind;
use std::fmt;

/// Errors from schedule parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// Invalid cron expression.
    InvalidCronExpression { expression: String, reason: String },
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCronExpression { expression, reason } => {
                write!(f, "invalid cron expression '{expression}': {reason}")
            }
        }
    }
}

impl std::error::Error for ScheduleError {}

/// Errors from trigger operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    /// The workflow needs input a schedule cannot supply.
    NotSchedulable { kind: WorkflowKind },
    /// Invalid trigger configuration.
    InvalidConfig { reason: String },
    /// The firing ledger could not be read or written.
    LedgerFailed { reason: String },
}

impl fmt::Display for TriggerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSchedulable { kind } => write!(f, "workflow {kind} cannot be scheduled"),
            Self::InvalidConfig { reason } => write!(f, "invalid trigger config: {reason}"),
            Self::LedgerFailed { reason } => write!(f, "firing ledger failed: {reason}"),
        }
    }
}

impl std::error::Error for TriggerError {}

impl From<ScheduleError> for TriggerError {
    fn from(e: ScheduleError) -> Self {
        Self::InvalidConfig {
            reason: e.to_string(),
        }
    }
}

/// High-level scheduler errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// A firing could not be claimed.
    Claim {
        kind: WorkflowKind,
        user_id: UserId,
        reason: String,
    },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Claim {
                kind,
                user_id,
                reason,
            } => write!(f, "claiming {kind} firing for {user_id} failed: {reason}"),
        }
    }
}

impl std::error::Error for SchedulerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_error_display() {
        let err = ScheduleError::InvalidCronExpression {
            expression: "invalid".to_string(),
            reason: "expected 5 fields".to_string(),
        };
        assert!(err.to_string().contains("invalid"));
        assert!(err.to_string().contains("5 fields"));
    }

    #[test]
    fn schedule_errors_become_config_errors() {
        let err: TriggerError = ScheduleError::InvalidCronExpression {
            expression: "* *".to_string(),
            reason: "expected 5 fields".to_string(),
        }
        .into();
        assert!(matches!(err, TriggerError::InvalidConfig { .. }));
    }

    #[test]
    fn scheduler_error_display() {
        let err = SchedulerError::Claim {
            kind: WorkflowKind::MorningCheck,
            user_id: UserId::new("demo-user").expect("user"),
            reason: "store down".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "claiming morning_check firing for demo-user failed: store down"
        );
    }
}
