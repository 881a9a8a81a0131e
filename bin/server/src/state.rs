//! Shared handler state.

use flowmentor_core::UserId;
use flowmentor_workflow::WorkflowRunner;

/// State shared by all routes.
#[derive(Debug, Clone)]
pub struct AppState {
    pub runner: WorkflowRunner,
    /// Owner of runs started without an explicit `user_id`.
    pub default_user: UserId,
}

impl AppState {
    #[must_use]
    pub fn new(runner: WorkflowRunner, default_user: UserId) -> Self {
        Self {
            runner,
            default_user,
        }
    }
}
