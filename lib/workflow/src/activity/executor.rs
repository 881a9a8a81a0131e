//! Runs activities with retries and an idempotency ledger.
//!
//! Every successful invocation is written to the ledger under its
//! idempotency key. A later invocation with the same key (a replay after a
//! restart) returns the recorded result and does not execute the activity
//! again. Ledger reads and writes are part of each attempt, so a store
//! outage is retried under the activity's policy like any transient error.

use crate::activity::{
    Activity, ActivityContext, ActivityError, ActivityFailure, ActivityRegistry, RetryPolicy,
};
use crate::clock::Clock;
use crate::execution::{ActivityInvocation, InvocationOutcome};
use chrono::{DateTime, Utc};
use flowmentor_core::WorkflowRunId;
use flowmentor_integration::DocumentStore;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// Document store collection holding successful invocations.
pub const LEDGER_COLLECTION: &str = "activity_results";

/// Executes activities on behalf of workflow steps.
#[derive(Clone)]
pub struct ActivityExecutor {
    registry: ActivityRegistry,
    ledger: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    overrides: HashMap<String, RetryPolicy>,
}

impl std::fmt::Debug for ActivityExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityExecutor")
            .field("registry", &self.registry)
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

impl ActivityExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(
        registry: ActivityRegistry,
        ledger: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            ledger,
            clock,
            overrides: HashMap::new(),
        }
    }

    /// Overrides the retry policy for one activity kind.
    #[must_use]
    pub fn with_policy(mut self, kind: impl Into<String>, policy: RetryPolicy) -> Self {
        self.overrides.insert(kind.into(), policy);
        self
    }

    /// Returns the policy used for `kind`.
    #[must_use]
    pub fn policy_for(&self, kind: &str) -> Option<RetryPolicy> {
        self.overrides
            .get(kind)
            .cloned()
            .or_else(|| self.registry.get(kind).map(|a| a.retry_policy()))
    }

    /// Invokes the activity for a run step.
    ///
    /// Never returns an error: failures are part of the returned invocation
    /// so the workflow can decide how to continue.
    #[instrument(skip(self, run_id, input), fields(run_id = %run_id))]
    pub async fn invoke(
        &self,
        run_id: WorkflowRunId,
        step: u32,
        kind: &str,
        input: JsonValue,
    ) -> ActivityInvocation {
        let call = Call {
            run_id,
            step,
            kind: kind.to_string(),
            key: ActivityInvocation::idempotency_key(run_id, step),
            started_at: self.clock.now(),
        };

        let Some(activity) = self.registry.get(kind).cloned() else {
            let message = format!("no activity registered for kind '{kind}'");
            return call.fail(input, 0, message, self.clock.now());
        };
        let policy = self
            .overrides
            .get(kind)
            .cloned()
            .unwrap_or_else(|| activity.retry_policy());

        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.attempt(&call, activity.as_ref(), attempt, &input).await {
                Ok(invocation) => return invocation,
                Err(err) => err,
            };
            if err.is_transient() && attempt < policy.attempts() {
                let delay = policy.delay_for(attempt);
                tracing::warn!(attempt, ?delay, error = %err, "activity attempt failed, retrying");
                tokio::time::sleep(delay).await;
                continue;
            }
            tracing::warn!(attempt, error = %err, "activity failed");
            return call.fail(input, attempt, err.to_string(), self.clock.now());
        }
    }

    /// One attempt: ledger lookup, execution, and ledger write.
    ///
    /// A result that could not be written to the ledger counts as a failed
    /// attempt, so history never holds a completion the ledger lacks.
    async fn attempt(
        &self,
        call: &Call,
        activity: &dyn Activity,
        attempt: u32,
        input: &JsonValue,
    ) -> Result<ActivityInvocation, ActivityError> {
        if let Some(recorded) = self.ledger.get(LEDGER_COLLECTION, &call.key).await? {
            match serde_json::from_value::<ActivityInvocation>(recorded) {
                Ok(invocation) => {
                    tracing::debug!(key = %call.key, "activity result found in ledger, skipping execution");
                    return Ok(invocation);
                }
                Err(e) => {
                    tracing::warn!(key = %call.key, error = %e, "unreadable ledger entry, executing again");
                }
            }
        }

        let ctx = ActivityContext {
            run_id: call.run_id,
            step: call.step,
            attempt,
            idempotency_key: call.key.clone(),
        };
        let result = activity.execute(&ctx, input.clone()).await?;

        let invocation = call.clone().finish(
            input.clone(),
            attempt,
            InvocationOutcome::Completed { result },
            self.clock.now(),
        );
        let document = serde_json::to_value(&invocation).map_err(|e| {
            ActivityError::permanent(format!("cannot encode invocation for the ledger: {e}"))
        })?;
        self.ledger
            .put(LEDGER_COLLECTION, &invocation.idempotency_key, document)
            .await?;
        Ok(invocation)
    }
}

/// The parts of an invocation known before it runs.
#[derive(Clone)]
struct Call {
    run_id: WorkflowRunId,
    step: u32,
    kind: String,
    key: String,
    started_at: DateTime<Utc>,
}

impl Call {
    fn finish(
        self,
        input: JsonValue,
        attempts: u32,
        outcome: InvocationOutcome,
        finished_at: DateTime<Utc>,
    ) -> ActivityInvocation {
        ActivityInvocation {
            run_id: self.run_id,
            step: self.step,
            kind: self.kind,
            input,
            idempotency_key: self.key,
            attempts,
            outcome,
            started_at: self.started_at,
            finished_at,
        }
    }

    fn fail(
        self,
        input: JsonValue,
        attempts: u32,
        message: String,
        finished_at: DateTime<Utc>,
    ) -> ActivityInvocation {
        let failure = ActivityFailure {
            kind: self.kind.clone(),
            attempts,
            message,
        };
        self.finish(
            input,
            attempts,
            InvocationOutcome::Failed { failure },
            finished_at,
        )
    }
}
