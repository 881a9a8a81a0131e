//! The trigger source: turns calendar occurrences into workflow runs.

use crate::error::{SchedulerError, TriggerError};
use crate::ledger::{Firing, FiringLedger};
use crate::trigger::{MissedExecutionBehavior, ScheduledTrigger};
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use flowmentor_core::{UserId, WorkflowRunId};
use flowmentor_workflow::{Clock, RunnerError, WorkflowKind, WorkflowRunner};
use rootcause::prelude::Report;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;

/// Starts workflow runs on behalf of the scheduler.
#[async_trait]
pub trait WorkflowStarter: Send + Sync {
    async fn start_workflow(
        &self,
        kind: WorkflowKind,
        user_id: UserId,
        input: JsonValue,
    ) -> Result<WorkflowRunId, RunnerError>;
}

#[async_trait]
impl WorkflowStarter for WorkflowRunner {
    async fn start_workflow(
        &self,
        kind: WorkflowKind,
        user_id: UserId,
        input: JsonValue,
    ) -> Result<WorkflowRunId, RunnerError> {
        self.start(kind.as_str(), user_id, input).await
    }
}

/// How occurrences are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Offset local times are evaluated in.
    pub utc_offset: FixedOffset,
    /// How late an occurrence may still fire under `Skip`.
    pub grace: Duration,
    pub missed_execution: MissedExecutionBehavior,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            utc_offset: Utc.fix(),
            grace: Duration::minutes(60),
            missed_execution: MissedExecutionBehavior::Skip,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub started: Vec<WorkflowRunId>,
    /// Occurrences already claimed earlier.
    pub already_fired: usize,
    /// Occurrences dropped for being older than the grace window.
    pub missed: usize,
    /// Claimed occurrences whose run could not be started.
    pub failed: usize,
}

/// Fires scheduled triggers.
pub struct Scheduler {
    triggers: Vec<ScheduledTrigger>,
    ledger: Arc<dyn FiringLedger>,
    starter: Arc<dyn WorkflowStarter>,
    config: SchedulerConfig,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("triggers", &self.triggers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new(
        triggers: Vec<ScheduledTrigger>,
        ledger: Arc<dyn FiringLedger>,
        starter: Arc<dyn WorkflowStarter>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            triggers,
            ledger,
            starter,
            config,
        }
    }

    #[must_use]
    pub fn triggers(&self) -> &[ScheduledTrigger] {
        &self.triggers
    }

    /// Fires every enabled trigger whose latest occurrence is due.
    ///
    /// Each occurrence is claimed in the ledger first; only the claim that
    /// wins starts a run.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be reached. Runs that fail to
    /// start are logged and counted, not returned.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickSummary, Report<SchedulerError>> {
        let mut summary = TickSummary::default();

        for trigger in self.triggers.iter().filter(|t| t.enabled) {
            let Some(occurrence) = trigger
                .schedule
                .latest_at_or_before(now, self.config.utc_offset)
            else {
                continue;
            };
            let late_by = now - occurrence;
            if late_by > self.config.grace
                && self.config.missed_execution == MissedExecutionBehavior::Skip
            {
                tracing::debug!(kind = %trigger.kind, %occurrence, "occurrence outside grace window skipped");
                summary.missed += 1;
                continue;
            }

            let local_date = occurrence.with_timezone(&self.config.utc_offset).date_naive();
            let key = trigger.firing_key(local_date);
            let mut firing = Firing {
                trigger_id: trigger.id,
                kind: trigger.kind,
                user_id: trigger.user_id.clone(),
                local_date,
                scheduled_for: occurrence,
                claimed_at: now,
                run_id: None,
            };

            let claimed = self
                .ledger
                .claim(&key, &firing)
                .await
                .map_err(|e| claim_error(trigger, &e))?;
            if !claimed {
                summary.already_fired += 1;
                continue;
            }

            let input = trigger.input(local_date);
            match self
                .starter
                .start_workflow(trigger.kind, trigger.user_id.clone(), input)
                .await
            {
                Ok(run_id) => {
                    tracing::info!(kind = %trigger.kind, user_id = %trigger.user_id, %run_id, %local_date, "scheduled workflow started");
                    firing.run_id = Some(run_id);
                    if let Err(e) = self.ledger.record_run(&key, &firing).await {
                        tracing::warn!(%key, error = %e, "recording started run failed");
                    }
                    summary.started.push(run_id);
                }
                Err(e) => {
                    tracing::error!(kind = %trigger.kind, user_id = %trigger.user_id, error = %e, "scheduled workflow failed to start");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Ticks every `interval` until `shutdown` completes.
    pub async fn run(
        &self,
        clock: Arc<dyn Clock>,
        interval: std::time::Duration,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("scheduler stopped");
                    return;
                }
                _ = ticker.tick() => {
                    match self.tick(clock.now()).await {
                        Ok(summary) if !summary.started.is_empty() => {
                            tracing::debug!(started = summary.started.len(), "scheduler tick");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "scheduler tick failed"),
                    }
                }
            }
        }
    }
}

fn claim_error(trigger: &ScheduledTrigger, e: &TriggerError) -> SchedulerError {
    SchedulerError::Claim {
        kind: trigger.kind,
        user_id: trigger.user_id.clone(),
        reason: e.to_string(),
    }
}
