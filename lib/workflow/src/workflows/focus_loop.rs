//! One focus block: notify, wait out the block, collect feedback.

use super::{notify, put_document, unexpected_step};
use crate::definition::{WorkflowDefinition, decode_input};
use crate::kind::WorkflowKind;
use crate::step::{Step, StepHistory};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

/// Collection holding per-block feedback, keyed `<user>:<date>:<block>`.
pub const FEEDBACK_COLLECTION: &str = "block_feedback";

/// Signal carrying the user's feedback after a block.
pub const SUBMIT_FEEDBACK: &str = "submit_feedback";

/// How long to wait for feedback after the end notification.
pub const FEEDBACK_TIMEOUT_MINUTES: i64 = 10;

/// The block a focus loop runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusBlockInfo {
    pub block_id: String,
    pub user_id: String,
    pub date: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub duration_minutes: u32,
}

/// Input of a focus loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusLoopInput {
    pub block: FocusBlockInfo,
}

/// Focus loop workflow.
#[derive(Debug, Clone, Copy, Default)]
pub struct FocusLoop;

impl WorkflowDefinition for FocusLoop {
    fn kind(&self) -> &str {
        WorkflowKind::FocusLoop.as_str()
    }

    fn next_step(&self, input: &JsonValue, history: &StepHistory) -> Step {
        let FocusLoopInput { block } = match decode_input(input) {
            Ok(input) => input,
            Err(step) => return step,
        };
        if block.duration_minutes == 0 {
            return Step::fail("focus block duration must be positive");
        }

        // Failed notifications are tolerated; only the feedback write is fatal.
        match history.len() {
            0 => notify(
                &block.user_id,
                format!(
                    "Focus block '{}' starts now ({} minutes).",
                    block.title, block.duration_minutes
                ),
            ),
            1 => Step::Timer {
                duration: Duration::minutes(i64::from(block.duration_minutes)),
            },
            2 => notify(
                &block.user_id,
                format!("Focus block '{}' is over. How did it go?", block.title),
            ),
            3 => Step::wait_for_signal(
                SUBMIT_FEEDBACK,
                Duration::minutes(FEEDBACK_TIMEOUT_MINUTES),
            ),
            4 => {
                let feedback = history.signal_payload(3).cloned().unwrap_or(JsonValue::Null);
                put_document(
                    FEEDBACK_COLLECTION,
                    format!("{}:{}:{}", block.user_id, block.date, block.block_id),
                    json!({
                        "type": "block_feedback",
                        "block_id": block.block_id,
                        "user_id": block.user_id,
                        "date": block.date,
                        "title": block.title,
                        "duration_minutes": block.duration_minutes,
                        "feedback": feedback,
                    }),
                )
            }
            5 => {
                if let Some(failure) = history.failure(4) {
                    return Step::fail(format!("storing block feedback failed: {failure}"));
                }
                let feedback = history.signal_payload(3).cloned();
                let message = if feedback.is_some() {
                    format!("Focus block '{}' completed with feedback", block.title)
                } else {
                    format!("Focus block '{}' completed without feedback", block.title)
                };
                Step::complete(&json!({
                    "success": true,
                    "block_id": block.block_id,
                    "feedback": feedback,
                    "message": message,
                }))
            }
            n => unexpected_step(self.kind(), n),
        }
    }
}
