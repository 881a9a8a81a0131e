//! Weekly review: aggregate the week, propose goals, let the user pick one.

use super::{document_key, put_document, unexpected_step};
use crate::activity::builtin::{AGGREGATE_WEEK, PROPOSE_MICRO_GOALS};
use crate::definition::{WorkflowDefinition, decode_input};
use crate::kind::WorkflowKind;
use crate::step::{Step, StepHistory};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

/// Collection holding weekly summaries, keyed `<user>:<week_start>`.
pub const WEEKLY_SUMMARIES_COLLECTION: &str = "weekly_summaries";

/// Signal naming the goal the user picked.
pub const SELECT_GOAL: &str = "select_goal";

/// How long the user has to pick a goal.
pub const SELECTION_TIMEOUT_HOURS: i64 = 24;

/// Input of a weekly review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyGrowthInput {
    pub user_id: String,
    /// ISO date, inclusive.
    pub week_start: String,
    /// ISO date, inclusive.
    pub week_end: String,
}

/// Aggregated figures for one week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyStats {
    pub total_blocks_completed: u32,
    pub total_blocks_planned: u32,
    pub average_productivity: f64,
    pub total_focus_hours: f64,
    pub top_achievements: Vec<String>,
    /// Challenges reported on at least two days.
    pub recurring_challenges: Vec<String>,
    /// Percentage, one decimal.
    pub completion_rate: f64,
}

/// A small goal proposed for next week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroGoal {
    pub goal_id: String,
    pub title: String,
    pub description: String,
    pub rationale: String,
    pub suggested_actions: Vec<String>,
    /// 1 (easy) to 5.
    pub difficulty: u8,
}

/// Input of the goal proposal activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposeGoalsInput {
    pub user_id: String,
    pub stats: WeeklyStats,
}

/// Resolves a `select_goal` payload against the proposed goals.
///
/// Accepts `{"goal_id": "..."}` or a bare goal id string. An id that names
/// none of the goals selects nothing.
#[must_use]
pub fn selected_goal<'a>(payload: &JsonValue, goals: &'a [MicroGoal]) -> Option<&'a MicroGoal> {
    let goal_id = payload
        .get("goal_id")
        .and_then(JsonValue::as_str)
        .or_else(|| payload.as_str())?;
    goals.iter().find(|goal| goal.goal_id == goal_id)
}

/// Weekly growth workflow.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeeklyGrowth;

impl WorkflowDefinition for WeeklyGrowth {
    fn kind(&self) -> &str {
        WorkflowKind::WeeklyGrowth.as_str()
    }

    fn next_step(&self, input: &JsonValue, history: &StepHistory) -> Step {
        let input: WeeklyGrowthInput = match decode_input(input) {
            Ok(input) => input,
            Err(step) => return step,
        };
        if history.is_empty() {
            return Step::activity(AGGREGATE_WEEK, &input);
        }

        if let Some(failure) = history.failure(0) {
            return Step::fail(format!("weekly aggregation failed: {failure}"));
        }
        let stats = match history.result::<WeeklyStats>(0) {
            Ok(stats) => stats,
            Err(reason) => return Step::fail(reason),
        };
        if history.len() == 1 {
            return Step::activity(
                PROPOSE_MICRO_GOALS,
                &ProposeGoalsInput {
                    user_id: input.user_id,
                    stats,
                },
            );
        }

        if let Some(failure) = history.failure(1) {
            return Step::fail(format!("micro-goal generation failed: {failure}"));
        }
        let goals = match history.result::<Vec<MicroGoal>>(1) {
            Ok(goals) => goals,
            Err(reason) => return Step::fail(reason),
        };
        let selected = history
            .signal_payload(2)
            .and_then(|payload| selected_goal(payload, &goals));

        match history.len() {
            2 => Step::wait_for_signal(SELECT_GOAL, Duration::hours(SELECTION_TIMEOUT_HOURS)),
            3 => put_document(
                WEEKLY_SUMMARIES_COLLECTION,
                document_key(&input.user_id, &input.week_start),
                json!({
                    "type": "weekly_summary",
                    "user_id": input.user_id,
                    "week_start": input.week_start,
                    "week_end": input.week_end,
                    "stats": stats,
                    "micro_goals": goals,
                    "selected_goal": selected,
                }),
            ),
            4 => {
                if let Some(failure) = history.failure(3) {
                    return Step::fail(format!("storing the weekly summary failed: {failure}"));
                }
                let message = match selected {
                    Some(goal) => format!("Weekly review completed. Next week's goal: {}", goal.title),
                    None => "Weekly review completed without a selected goal".to_string(),
                };
                Step::complete(&json!({
                    "success": true,
                    "weekly_stats": stats,
                    "micro_goals": goals,
                    "selected_goal": selected,
                    "message": message,
                }))
            }
            n => unexpected_step(self.kind(), n),
        }
    }
}
