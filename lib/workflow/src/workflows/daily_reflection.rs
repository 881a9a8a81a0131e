//! End-of-day reflection: summarize, store, notify.

use super::{document_key, notify, put_document, unexpected_step};
use crate::activity::builtin::SUMMARIZE_DAY;
use crate::definition::{WorkflowDefinition, decode_input};
use crate::kind::WorkflowKind;
use crate::step::{Step, StepHistory};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

/// Collection holding reflections, keyed `<user>:<date>`.
pub const REFLECTIONS_COLLECTION: &str = "reflections";

/// Input of a daily reflection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyReflectionInput {
    pub user_id: String,
    pub date: String,
    #[serde(default)]
    pub reflection_text: String,
    #[serde(default)]
    pub completed_blocks: u32,
    #[serde(default)]
    pub total_blocks: u32,
    /// Self-rated, 1 to 5; 0 when not given.
    #[serde(default)]
    pub overall_productivity: u8,
    #[serde(default)]
    pub wins: Vec<String>,
    #[serde(default)]
    pub challenges: Vec<String>,
}

impl DailyReflectionInput {
    /// Percentage of planned blocks completed, 0 when none were planned.
    #[must_use]
    pub fn completion_rate(&self) -> f64 {
        if self.total_blocks == 0 {
            0.0
        } else {
            f64::from(self.completed_blocks) / f64::from(self.total_blocks) * 100.0
        }
    }
}

/// Summary of a day, written by the text generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectionSummary {
    pub summary: String,
    pub key_insights: Vec<String>,
    pub micro_tips: Vec<String>,
    pub suggested_improvements: Vec<String>,
}

impl ReflectionSummary {
    /// Builds a summary around generated prose.
    #[must_use]
    pub fn build(input: &DailyReflectionInput, summary: String) -> Self {
        Self {
            summary,
            key_insights: key_insights(input),
            micro_tips: vec![
                "Schedule your most demanding task earlier in the day".to_string(),
                "Break complex work into smaller focus blocks".to_string(),
                "Review today's wins to build momentum for tomorrow".to_string(),
            ],
            suggested_improvements: vec![
                "Add buffer time between blocks for smoother transitions".to_string(),
                "Plan around the challenges that keep coming back".to_string(),
            ],
        }
    }

    /// Summary used when text generation is unavailable.
    #[must_use]
    pub fn placeholder(input: &DailyReflectionInput) -> Self {
        Self {
            summary: "Summary unavailable right now. Your reflection was saved.".to_string(),
            key_insights: key_insights(input),
            micro_tips: Vec::new(),
            suggested_improvements: Vec::new(),
        }
    }
}

fn key_insights(input: &DailyReflectionInput) -> Vec<String> {
    vec![
        format!("Completion rate: {:.0}%", input.completion_rate()),
        format!("Productivity level: {}/5", input.overall_productivity),
        format!("Wins today: {}", input.wins.len()),
        format!("Challenges faced: {}", input.challenges.len()),
    ]
}

/// Daily reflection workflow.
#[derive(Debug, Clone, Copy, Default)]
pub struct DailyReflection;

impl DailyReflection {
    /// The summary from step 0, or the placeholder if it failed.
    fn summary(input: &DailyReflectionInput, history: &StepHistory) -> (ReflectionSummary, bool) {
        match history.result::<ReflectionSummary>(0) {
            Ok(summary) => (summary, true),
            Err(_) => (ReflectionSummary::placeholder(input), false),
        }
    }
}

impl WorkflowDefinition for DailyReflection {
    fn kind(&self) -> &str {
        WorkflowKind::DailyReflection.as_str()
    }

    fn next_step(&self, input: &JsonValue, history: &StepHistory) -> Step {
        let input: DailyReflectionInput = match decode_input(input) {
            Ok(input) => input,
            Err(step) => return step,
        };

        match history.len() {
            0 => Step::activity(SUMMARIZE_DAY, &input),
            1 => {
                let (summary, _) = Self::summary(&input, history);
                let mut document = match serde_json::to_value(&input) {
                    Ok(document) => document,
                    Err(e) => return Step::fail(format!("cannot encode reflection: {e}")),
                };
                document["type"] = json!("reflection");
                document["ai_summary"] = json!(summary);
                put_document(
                    REFLECTIONS_COLLECTION,
                    document_key(&input.user_id, &input.date),
                    document,
                )
            }
            2 => {
                if let Some(failure) = history.failure(1) {
                    return Step::fail(format!("storing the reflection failed: {failure}"));
                }
                let (summary, _) = Self::summary(&input, history);
                notify(
                    &input.user_id,
                    format!("Your day in review: {}", summary.summary),
                )
            }
            3 => {
                let (summary, generated) = Self::summary(&input, history);
                Step::complete(&json!({
                    "success": true,
                    "ai_summary": summary,
                    "summary_generated": generated,
                    "notified": history.succeeded(2),
                    "message": "Daily reflection completed and insights generated successfully",
                }))
            }
            n => unexpected_step(self.kind(), n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityFailure;
    use crate::step::StepOutcome;

    fn input() -> JsonValue {
        json!({
            "user_id": "demo-user",
            "date": "2024-06-03",
            "reflection_text": "Good momentum before lunch",
            "completed_blocks": 2,
            "total_blocks": 3,
            "overall_productivity": 4,
            "wins": ["Shipped the draft"],
            "challenges": ["Slack"],
        })
    }

    fn failed(kind: &str) -> StepOutcome {
        StepOutcome::ActivityFailed(ActivityFailure {
            kind: kind.to_string(),
            attempts: 3,
            message: "unavailable".to_string(),
        })
    }

    #[test]
    fn completion_rate_handles_zero_planned() {
        let input: DailyReflectionInput = serde_json::from_value(json!({
            "user_id": "demo-user",
            "date": "2024-06-03",
        }))
        .expect("decode");
        assert!(input.completion_rate().abs() < f64::EPSILON);
    }

    #[test]
    fn summary_failure_uses_placeholder_and_continues() {
        let history: StepHistory = [failed(SUMMARIZE_DAY)].into_iter().collect();
        let Step::Activity { input: put, .. } = DailyReflection.next_step(&input(), &history) else {
            panic!("expected put");
        };
        assert_eq!(put["collection"], REFLECTIONS_COLLECTION);
        assert_eq!(put["document"]["completed_blocks"], 2);
        assert_eq!(put["document"]["ai_summary"]["key_insights"][0], "Completion rate: 67%");
        assert!(
            put["document"]["ai_summary"]["summary"]
                .as_str()
                .is_some_and(|s| s.starts_with("Summary unavailable"))
        );
    }

    #[test]
    fn notification_failure_completes_unnotified() {
        let decoded: DailyReflectionInput = serde_json::from_value(input()).expect("decode");
        let summary = ReflectionSummary::build(&decoded, "A steady day.".to_string());
        let history: StepHistory = [
            StepOutcome::ActivityCompleted(json!(summary)),
            StepOutcome::ActivityCompleted(json!({})),
            failed("send_notification"),
        ]
        .into_iter()
        .collect();

        let Step::Complete { result } = DailyReflection.next_step(&input(), &history) else {
            panic!("expected completion");
        };
        assert_eq!(result["notified"], false);
        assert_eq!(result["summary_generated"], true);
        assert_eq!(result["ai_summary"]["summary"], "A steady day.");
    }

    #[test]
    fn storage_failure_fails_the_run() {
        let history: StepHistory = [
            StepOutcome::ActivityCompleted(json!({})),
            failed("put_document"),
        ]
        .into_iter()
        .collect();
        assert!(matches!(
            DailyReflection.next_step(&input(), &history),
            Step::Fail { .. }
        ));
    }
}
