//! Durable run history.
//!
//! A [`HistoryStore`] keeps the ordered [`RunEvent`] stream of every run.
//! The runner appends to it before acting on an event, so a restarted
//! process can rebuild each run exactly where it stopped.

use crate::envelope::Envelope;
use crate::error::HistoryError;
use crate::execution::RunEvent;
use async_trait::async_trait;
use flowmentor_core::WorkflowRunId;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Trait for event persistence.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends an event to its run's stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the event could not be stored.
    async fn append(&self, event: Envelope<RunEvent>) -> Result<(), HistoryError>;

    /// Loads all events for a run, earliest first.
    ///
    /// An unknown run yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the events cannot be read or decoded.
    async fn load_events(&self, run_id: WorkflowRunId) -> Result<Vec<RunEvent>, HistoryError>;

    /// Lists runs whose last event is not terminal.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    async fn list_unfinished(&self) -> Result<Vec<WorkflowRunId>, HistoryError>;
}

/// History held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    runs: RwLock<BTreeMap<WorkflowRunId, Vec<Envelope<RunEvent>>>>,
}

impl InMemoryHistoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding a copy of the given events.
    ///
    /// Used to simulate a restart from a history prefix.
    pub async fn seeded(events: impl IntoIterator<Item = RunEvent>) -> Self {
        let store = Self::new();
        {
            let mut runs = store.runs.write().await;
            for event in events {
                runs.entry(event.run_id())
                    .or_default()
                    .push(Envelope::new(event));
            }
        }
        store
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, event: Envelope<RunEvent>) -> Result<(), HistoryError> {
        let run_id = event.payload().run_id();
        self.runs.write().await.entry(run_id).or_default().push(event);
        Ok(())
    }

    async fn load_events(&self, run_id: WorkflowRunId) -> Result<Vec<RunEvent>, HistoryError> {
        let runs = self.runs.read().await;
        let Some(stored) = runs.get(&run_id) else {
            return Ok(Vec::new());
        };

        stored
            .iter()
            .map(|envelope| {
                if envelope.is_current_version() {
                    Ok(envelope.payload().clone())
                } else {
                    Err(HistoryError::UnsupportedVersion {
                        run_id,
                        version: envelope.version,
                    })
                }
            })
            .collect()
    }

    async fn list_unfinished(&self) -> Result<Vec<WorkflowRunId>, HistoryError> {
        let runs = self.runs.read().await;
        Ok(runs
            .iter()
            .filter(|(_, events)| {
                events
                    .last()
                    .is_some_and(|last| !last.payload().is_terminal())
            })
            .map(|(run_id, _)| *run_id)
            .collect())
    }
}
