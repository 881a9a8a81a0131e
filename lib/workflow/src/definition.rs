//! Workflow definitions.
//!
//! A definition is a pure decision function: given the run input and the
//! outcomes of the steps finished so far, it returns the next [`Step`]. It
//! must not read the clock, draw random numbers, or call services; the
//! runner feeds all of that back through recorded history so replaying a
//! run always makes the same decisions.

use crate::step::{Step, StepHistory};
use crate::workflows::{DailyReflection, FocusLoop, MeetingScheduler, MorningCheck, WeeklyGrowth};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Decides the steps of one kind of workflow.
pub trait WorkflowDefinition: Send + Sync {
    /// Name runs of this workflow are started with.
    fn kind(&self) -> &str;

    /// Returns the step at index `history.len()`.
    fn next_step(&self, input: &JsonValue, history: &StepHistory) -> Step;
}

/// Workflow definitions by kind.
#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    definitions: HashMap<String, Arc<dyn WorkflowDefinition>>,
}

impl WorkflowRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the five built-in workflows.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MorningCheck));
        registry.register(Arc::new(FocusLoop));
        registry.register(Arc::new(DailyReflection));
        registry.register(Arc::new(WeeklyGrowth));
        registry.register(Arc::new(MeetingScheduler));
        registry
    }

    /// Registers a definition under its kind, replacing any previous one.
    pub fn register(&mut self, definition: Arc<dyn WorkflowDefinition>) {
        self.definitions
            .insert(definition.kind().to_string(), definition);
    }

    /// Looks up a definition.
    #[must_use]
    pub fn get(&self, kind: &str) -> Option<&Arc<dyn WorkflowDefinition>> {
        self.definitions.get(kind)
    }

    /// Returns the registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Decodes a run input, or returns the step that fails the run.
pub(crate) fn decode_input<T: DeserializeOwned>(input: &JsonValue) -> Result<T, Step> {
    T::deserialize(input).map_err(|e| Step::fail(format!("invalid workflow input: {e}")))
}
