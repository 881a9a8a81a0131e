//! Morning planning: generate the day plan, store it, return it.

use super::{document_key, put_document, unexpected_step};
use crate::activity::builtin::GENERATE_DAY_PLAN;
use crate::definition::{WorkflowDefinition, decode_input};
use crate::kind::WorkflowKind;
use crate::step::{Step, StepHistory};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

/// Collection holding day plans, keyed `<user>:<date>`.
pub const PLANS_COLLECTION: &str = "plans";

const DAY_START_MINUTES: u32 = 9 * 60;
const BREAK_MINUTES: u32 = 15;
const MAX_BLOCKS: usize = 3;

/// Input of a morning check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MorningCheckInput {
    pub user_id: String,
    /// ISO date of the planned day.
    pub date: String,
    #[serde(default)]
    pub morning_reflection: String,
    /// Self-reported energy, 1 to 5.
    pub energy_level: u8,
    #[serde(default)]
    pub priorities: Vec<String>,
}

/// A planned block of focused work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusBlock {
    pub block_id: String,
    pub title: String,
    pub description: String,
    /// Local time, `HH:MM`.
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: u32,
}

/// A recurring habit slotted into the day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Routine {
    pub name: String,
    pub time: String,
    pub duration_minutes: u32,
}

/// The generated plan for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayPlan {
    pub focus_blocks: Vec<FocusBlock>,
    pub routines: Vec<Routine>,
    pub micro_tips: Vec<String>,
}

impl DayPlan {
    /// Lays out focus blocks for the input's priorities.
    ///
    /// One block per priority (at most three, at least one) starting at
    /// 09:00, separated by 15 minute breaks. Block length follows energy:
    /// 90 minutes at 4 or more, 60 at 3, 45 below.
    #[must_use]
    pub fn build(input: &MorningCheckInput, micro_tips: Vec<String>) -> Self {
        let duration = block_minutes(input.energy_level);
        let mut titles: Vec<&str> = input
            .priorities
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .take(MAX_BLOCKS)
            .collect();
        if titles.is_empty() {
            titles.push("Deep Work Session");
        }

        let mut start = DAY_START_MINUTES;
        let focus_blocks = titles
            .into_iter()
            .enumerate()
            .map(|(i, title)| {
                let end = start + duration;
                let block = FocusBlock {
                    block_id: format!("block-{}", i + 1),
                    title: title.to_string(),
                    description: format!("Focus on: {title}"),
                    start_time: clock_time(start),
                    end_time: clock_time(end),
                    duration_minutes: duration,
                };
                start = end + BREAK_MINUTES;
                block
            })
            .collect();

        Self {
            focus_blocks,
            routines: vec![
                Routine {
                    name: "Morning Stretch".to_string(),
                    time: "08:45".to_string(),
                    duration_minutes: 15,
                },
                Routine {
                    name: "Afternoon Break".to_string(),
                    time: "15:00".to_string(),
                    duration_minutes: 10,
                },
            ],
            micro_tips,
        }
    }
}

fn block_minutes(energy_level: u8) -> u32 {
    match energy_level {
        4..=u8::MAX => 90,
        3 => 60,
        _ => 45,
    }
}

fn clock_time(minutes: u32) -> String {
    format!("{:02}:{:02}", (minutes / 60) % 24, minutes % 60)
}

/// Morning check workflow.
#[derive(Debug, Clone, Copy, Default)]
pub struct MorningCheck;

impl WorkflowDefinition for MorningCheck {
    fn kind(&self) -> &str {
        WorkflowKind::MorningCheck.as_str()
    }

    fn next_step(&self, input: &JsonValue, history: &StepHistory) -> Step {
        let input: MorningCheckInput = match decode_input(input) {
            Ok(input) => input,
            Err(step) => return step,
        };

        match history.len() {
            0 => Step::activity(GENERATE_DAY_PLAN, &input),
            1 => {
                if let Some(failure) = history.failure(0) {
                    return Step::fail(format!("day plan generation failed: {failure}"));
                }
                let plan = match history.result::<DayPlan>(0) {
                    Ok(plan) => plan,
                    Err(reason) => return Step::fail(reason),
                };
                put_document(
                    PLANS_COLLECTION,
                    document_key(&input.user_id, &input.date),
                    json!({
                        "type": "day_plan",
                        "user_id": input.user_id,
                        "date": input.date,
                        "plan": plan,
                    }),
                )
            }
            2 => {
                if let Some(failure) = history.failure(1) {
                    return Step::fail(format!("storing the day plan failed: {failure}"));
                }
                match history.result::<JsonValue>(0) {
                    Ok(plan) => Step::complete(&json!({
                        "success": true,
                        "plan": plan,
                        "message": "Morning check completed and plan generated successfully",
                    })),
                    Err(reason) => Step::fail(reason),
                }
            }
            n => unexpected_step(self.kind(), n),
        }
    }
}
