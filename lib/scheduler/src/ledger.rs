//! Durable record of which scheduled firings already happened.
//!
//! A firing is identified by `(kind, user, local date)`. Claiming a key is
//! insert-if-absent, so two schedulers (or two ticks of one) racing for the
//! same occurrence start the workflow once.

use crate::error::TriggerError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use flowmentor_core::{TriggerId, UserId, WorkflowRunId};
use flowmentor_integration::DocumentStore;
use flowmentor_workflow::WorkflowKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Collection holding firing records.
pub const FIRINGS_COLLECTION: &str = "schedule_firings";

/// One claimed occurrence of a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Firing {
    pub trigger_id: TriggerId,
    pub kind: WorkflowKind,
    pub user_id: UserId,
    pub local_date: NaiveDate,
    pub scheduled_for: DateTime<Utc>,
    pub claimed_at: DateTime<Utc>,
    /// Set once the run has been started.
    pub run_id: Option<WorkflowRunId>,
}

/// Trait for firing ledger storage.
#[async_trait]
pub trait FiringLedger: Send + Sync {
    /// Claims a firing key.
    ///
    /// Returns `true` only for the first claim of a key.
    async fn claim(&self, key: &str, firing: &Firing) -> Result<bool, TriggerError>;

    /// Records the run a claimed firing started.
    async fn record_run(&self, key: &str, firing: &Firing) -> Result<(), TriggerError>;
}

/// Firing ledger kept in the document store.
#[derive(Clone)]
pub struct DocumentFiringLedger {
    store: Arc<dyn DocumentStore>,
}

impl DocumentFiringLedger {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

impl std::fmt::Debug for DocumentFiringLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentFiringLedger").finish_non_exhaustive()
    }
}

fn encode(firing: &Firing) -> Result<serde_json::Value, TriggerError> {
    serde_json::to_value(firing).map_err(|e| TriggerError::LedgerFailed {
        reason: e.to_string(),
    })
}

#[async_trait]
impl FiringLedger for DocumentFiringLedger {
    async fn claim(&self, key: &str, firing: &Firing) -> Result<bool, TriggerError> {
        self.store
            .put_if_absent(FIRINGS_COLLECTION, key, encode(firing)?)
            .await
            .map_err(|e| TriggerError::LedgerFailed {
                reason: e.to_string(),
            })
    }

    async fn record_run(&self, key: &str, firing: &Firing) -> Result<(), TriggerError> {
        self.store
            .put(FIRINGS_COLLECTION, key, encode(firing)?)
            .await
            .map_err(|e| TriggerError::LedgerFailed {
                reason: e.to_string(),
            })
    }
}
