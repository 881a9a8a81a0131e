//! The five FlowMentor workflows.
//!
//! Each module holds the payload types a workflow exchanges with its
//! activities and callers, plus the [`crate::definition::WorkflowDefinition`]
//! that decides its steps.

pub mod daily_reflection;
pub mod focus_loop;
pub mod meeting_scheduler;
pub mod morning_check;
pub mod weekly_growth;

pub use daily_reflection::DailyReflection;
pub use focus_loop::FocusLoop;
pub use meeting_scheduler::MeetingScheduler;
pub use morning_check::MorningCheck;
pub use weekly_growth::WeeklyGrowth;

use crate::activity::builtin::{PutDocumentInput, SendNotificationInput};
use crate::activity::builtin::{PUT_DOCUMENT, SEND_NOTIFICATION};
use crate::step::Step;
use serde_json::Value as JsonValue;

/// Document key used for per-user, per-period records.
pub(crate) fn document_key(user_id: &str, period: &str) -> String {
    format!("{user_id}:{period}")
}

/// Step that writes a document.
pub(crate) fn put_document(collection: &str, key: String, document: JsonValue) -> Step {
    Step::activity(
        PUT_DOCUMENT,
        &PutDocumentInput {
            collection: collection.to_string(),
            key,
            document,
        },
    )
}

/// Step that notifies a user.
pub(crate) fn notify(user_id: &str, message: String) -> Step {
    Step::activity(
        SEND_NOTIFICATION,
        &SendNotificationInput {
            user_id: user_id.to_string(),
            message,
        },
    )
}

/// Terminal step for a history longer than the workflow has steps.
pub(crate) fn unexpected_step(kind: &str, step: usize) -> Step {
    Step::fail(format!("{kind} has no step {step}"))
}
