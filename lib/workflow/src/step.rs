//! Steps decided by workflow definitions and the outcomes fed back to them.

use crate::activity::ActivityFailure;
use chrono::Duration;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// What a workflow wants to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Run an activity and feed its result back.
    Activity { kind: String, input: JsonValue },
    /// Sleep durably for the given duration.
    Timer { duration: Duration },
    /// Wait for a named signal, giving up after `timeout`.
    WaitForSignal { name: String, timeout: Duration },
    /// Finish successfully.
    Complete { result: JsonValue },
    /// Finish with an error.
    Fail { reason: String },
    /// Finish in the timed-out state.
    TimeOut { reason: String },
}

impl Step {
    /// Schedules an activity, encoding its input.
    pub fn activity(kind: &str, input: &impl Serialize) -> Self {
        match serde_json::to_value(input) {
            Ok(input) => Self::Activity {
                kind: kind.to_string(),
                input,
            },
            Err(e) => Self::fail(format!("cannot encode input for {kind}: {e}")),
        }
    }

    /// Completes the run, encoding its result.
    pub fn complete(result: &impl Serialize) -> Self {
        match serde_json::to_value(result) {
            Ok(result) => Self::Complete { result },
            Err(e) => Self::fail(format!("cannot encode result: {e}")),
        }
    }

    /// Fails the run.
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail {
            reason: reason.into(),
        }
    }

    /// Waits for a signal.
    pub fn wait_for_signal(name: impl Into<String>, timeout: Duration) -> Self {
        Self::WaitForSignal {
            name: name.into(),
            timeout,
        }
    }
}

/// Outcome of one completed step, as recorded in history.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    ActivityCompleted(JsonValue),
    ActivityFailed(ActivityFailure),
    TimerFired,
    SignalReceived(JsonValue),
    WaitTimedOut,
}

/// Ordered outcomes of the steps a run has finished so far.
///
/// The index of the next step is always `len()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepHistory {
    outcomes: Vec<StepOutcome>,
}

impl StepHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of finished steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns true if no step has finished.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Index the next step will get.
    #[must_use]
    pub fn next_index(&self) -> u32 {
        u32::try_from(self.outcomes.len()).unwrap_or(u32::MAX)
    }

    /// Returns the outcome of step `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&StepOutcome> {
        self.outcomes.get(index)
    }

    /// Appends the outcome of the step at `len()`.
    pub fn push(&mut self, outcome: StepOutcome) {
        self.outcomes.push(outcome);
    }

    /// Returns the failure of step `index`, if it was a failed activity.
    #[must_use]
    pub fn failure(&self, index: usize) -> Option<&ActivityFailure> {
        match self.outcomes.get(index) {
            Some(StepOutcome::ActivityFailed(failure)) => Some(failure),
            _ => None,
        }
    }

    /// Returns true if step `index` was an activity that succeeded.
    #[must_use]
    pub fn succeeded(&self, index: usize) -> bool {
        matches!(
            self.outcomes.get(index),
            Some(StepOutcome::ActivityCompleted(_))
        )
    }

    /// Decodes the result of the successful activity at step `index`.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the step is missing, did not
    /// succeed, or its result does not decode as `T`.
    pub fn result<T: DeserializeOwned>(&self, index: usize) -> Result<T, String> {
        match self.outcomes.get(index) {
            Some(StepOutcome::ActivityCompleted(value)) => serde_json::from_value(value.clone())
                .map_err(|e| format!("step {index} result is malformed: {e}")),
            Some(other) => Err(format!("step {index} has no activity result: {other:?}")),
            None => Err(format!("step {index} has not run")),
        }
    }

    /// Returns the payload of step `index` if it received a signal.
    ///
    /// `None` means the wait timed out (or the step was not a signal wait).
    #[must_use]
    pub fn signal_payload(&self, index: usize) -> Option<&JsonValue> {
        match self.outcomes.get(index) {
            Some(StepOutcome::SignalReceived(payload)) => Some(payload),
            _ => None,
        }
    }
}

impl FromIterator<StepOutcome> for StepHistory {
    fn from_iter<I: IntoIterator<Item = StepOutcome>>(iter: I) -> Self {
        Self {
            outcomes: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn activity_step_encodes_input() {
        let step = Step::activity("send_notification", &json!({"message": "hi"}));
        assert_eq!(
            step,
            Step::Activity {
                kind: "send_notification".to_string(),
                input: json!({"message": "hi"}),
            }
        );
    }

    #[test]
    fn history_lookups() {
        let failure = ActivityFailure {
            kind: "put_document".to_string(),
            attempts: 3,
            message: "store down".to_string(),
        };
        let history: StepHistory = [
            StepOutcome::ActivityCompleted(json!({"delivered": true})),
            StepOutcome::TimerFired,
            StepOutcome::ActivityFailed(failure.clone()),
            StepOutcome::SignalReceived(json!("great")),
            StepOutcome::WaitTimedOut,
        ]
        .into_iter()
        .collect();

        assert_eq!(history.next_index(), 5);
        assert!(history.succeeded(0));
        assert!(!history.succeeded(2));
        assert_eq!(history.failure(2), Some(&failure));
        assert_eq!(history.signal_payload(3), Some(&json!("great")));
        assert_eq!(history.signal_payload(4), None);

        let delivered: JsonValue = history.result(0).expect("result");
        assert_eq!(delivered["delivered"], true);
        assert!(history.result::<JsonValue>(1).is_err());
        assert!(history.result::<JsonValue>(9).is_err());
    }
}
