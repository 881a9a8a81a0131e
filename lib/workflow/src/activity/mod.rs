//! Activities: the non-deterministic work a workflow delegates.
//!
//! Workflow definitions never touch the store, the notifier, or the text
//! generator. They return [`crate::step::Step::Activity`] and the
//! [`ActivityExecutor`] runs the matching [`Activity`] with retries and an
//! idempotency key derived from `(run_id, step)`.

pub mod builtin;
pub mod executor;
pub mod retry;

pub use builtin::ActivityServices;
pub use executor::{ActivityExecutor, LEDGER_COLLECTION};
pub use retry::RetryPolicy;

use async_trait::async_trait;
use flowmentor_ai::{GenerationError, PromptError};
use flowmentor_core::WorkflowRunId;
use flowmentor_integration::{NotifyError, StoreError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Per-call information handed to an activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityContext {
    pub run_id: WorkflowRunId,
    pub step: u32,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Stable across retries and restarts; pass it to external systems.
    pub idempotency_key: String,
}

/// Error raised by a single activity attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityError {
    /// May succeed if retried.
    Transient { message: String },
    /// Will fail again; do not retry.
    Permanent { message: String },
}

impl ActivityError {
    /// Creates a retryable error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Creates a non-retryable error.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    /// Returns true if the executor should retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl fmt::Display for ActivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient { message } | Self::Permanent { message } => f.write_str(message),
        }
    }
}

impl std::error::Error for ActivityError {}

impl From<StoreError> for ActivityError {
    fn from(e: StoreError) -> Self {
        if e.is_transient() {
            Self::transient(e.to_string())
        } else {
            Self::permanent(e.to_string())
        }
    }
}

impl From<NotifyError> for ActivityError {
    fn from(e: NotifyError) -> Self {
        if e.is_transient() {
            Self::transient(e.to_string())
        } else {
            Self::permanent(e.to_string())
        }
    }
}

impl From<GenerationError> for ActivityError {
    fn from(e: GenerationError) -> Self {
        if e.is_retryable() {
            Self::transient(e.to_string())
        } else {
            Self::permanent(e.to_string())
        }
    }
}

impl From<PromptError> for ActivityError {
    fn from(e: PromptError) -> Self {
        Self::permanent(e.to_string())
    }
}

/// Final failure of an activity step, handed to the workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityFailure {
    /// Activity kind.
    pub kind: String,
    /// Attempts made before giving up.
    pub attempts: u32,
    /// Last error message.
    pub message: String,
}

impl fmt::Display for ActivityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed after {} attempt(s): {}",
            self.kind, self.attempts, self.message
        )
    }
}

/// A unit of non-deterministic work.
#[async_trait]
pub trait Activity: Send + Sync {
    /// Name the workflow uses to schedule this activity.
    fn kind(&self) -> &'static str;

    /// Retry policy used when no override is configured.
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }

    /// Runs one attempt.
    ///
    /// # Errors
    ///
    /// Returns a transient error to ask for a retry, or a permanent one to
    /// fail the step immediately.
    async fn execute(
        &self,
        ctx: &ActivityContext,
        input: JsonValue,
    ) -> Result<JsonValue, ActivityError>;
}

/// Activities available to the executor, by kind.
#[derive(Clone, Default)]
pub struct ActivityRegistry {
    activities: HashMap<String, Arc<dyn Activity>>,
}

impl ActivityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an activity under its kind, replacing any previous one.
    pub fn register(&mut self, activity: Arc<dyn Activity>) {
        self.activities
            .insert(activity.kind().to_string(), activity);
    }

    /// Looks up an activity.
    #[must_use]
    pub fn get(&self, kind: &str) -> Option<&Arc<dyn Activity>> {
        self.activities.get(kind)
    }

    /// Returns the registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.activities.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl fmt::Debug for ActivityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Decodes an activity input.
pub(crate) fn decode_input<T: DeserializeOwned>(
    kind: &str,
    input: JsonValue,
) -> Result<T, ActivityError> {
    serde_json::from_value(input)
        .map_err(|e| ActivityError::permanent(format!("invalid input for {kind}: {e}")))
}

/// Encodes an activity output.
pub(crate) fn encode_output(value: &impl Serialize) -> Result<JsonValue, ActivityError> {
    serde_json::to_value(value)
        .map_err(|e| ActivityError::permanent(format!("cannot encode output: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_retryability() {
        let err: ActivityError = StoreError::Unavailable {
            reason: "timeout".to_string(),
        }
        .into();
        assert!(err.is_transient());

        let err: ActivityError = NotifyError::Rejected {
            reason: "unknown user".to_string(),
        }
        .into();
        assert!(!err.is_transient());

        let err: ActivityError = GenerationError::RateLimited {
            retry_after_secs: None,
        }
        .into();
        assert!(err.is_transient());
    }

    #[test]
    fn failure_display() {
        let failure = ActivityFailure {
            kind: "send_notification".to_string(),
            attempts: 3,
            message: "channel down".to_string(),
        };
        assert_eq!(
            failure.to_string(),
            "send_notification failed after 3 attempt(s): channel down"
        );
    }

    #[test]
    fn decode_input_is_permanent_on_mismatch() {
        let err = decode_input::<u32>("put_document", serde_json::json!("text")).unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("put_document"));
    }
}
