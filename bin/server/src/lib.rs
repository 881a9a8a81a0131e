//! FlowMentor HTTP server.
//!
//! Hosts the workflow runner behind a small JSON API, persists history and
//! documents in PostgreSQL, and drives the durable timer loop and the
//! calendar scheduler in the background.

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;

use flowmentor_ai::{PromptRegistry, TextGenerator};
use flowmentor_integration::{DocumentStore, Notifier};
use flowmentor_workflow::{
    ActivityExecutor, ActivityRegistry, ActivityServices, Clock, HistoryStore, WorkflowRegistry,
    WorkflowRunner,
};
use std::sync::Arc;

/// Wires the standard workflows and activities to the given services.
///
/// The document store doubles as the activity idempotency ledger.
pub fn build_runner(
    history: Arc<dyn HistoryStore>,
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
    generator: Arc<dyn TextGenerator>,
    clock: Arc<dyn Clock>,
) -> WorkflowRunner {
    let services = ActivityServices {
        store: store.clone(),
        notifier,
        generator,
        prompts: Arc::new(PromptRegistry::standard()),
    };
    let executor = ActivityExecutor::new(
        ActivityRegistry::standard(&services),
        store,
        clock.clone(),
    );
    WorkflowRunner::new(WorkflowRegistry::standard(), executor, history, clock)
}
