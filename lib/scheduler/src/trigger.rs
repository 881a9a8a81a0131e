//! Scheduled triggers and the workflow input each firing supplies.

use crate::error::TriggerError;
use crate::schedule::CronSchedule;
use chrono::{Days, NaiveDate};
use flowmentor_core::{TriggerId, UserId};
use flowmentor_workflow::WorkflowKind;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

/// 08:30 every day.
pub const MORNING_CHECK_CRON: &str = "30 8 * * *";
/// 16:30 every day.
pub const DAILY_REFLECTION_CRON: &str = "30 16 * * *";
/// 10:00 on Sundays.
pub const WEEKLY_GROWTH_CRON: &str = "0 10 * * 0";

/// Behavior when a scheduled occurrence was missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissedExecutionBehavior {
    /// Drop occurrences older than the grace window.
    #[default]
    Skip,
    /// Fire the latest missed occurrence whatever its age.
    RunImmediately,
}

/// Starts one workflow kind for one user on a calendar schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTrigger {
    pub id: TriggerId,
    pub kind: WorkflowKind,
    pub user_id: UserId,
    pub schedule: CronSchedule,
    pub enabled: bool,
}

impl ScheduledTrigger {
    /// Creates an enabled trigger.
    ///
    /// # Errors
    ///
    /// Returns `NotSchedulable` for workflows whose input cannot be derived
    /// from a date alone.
    pub fn new(kind: WorkflowKind, user_id: UserId, schedule: CronSchedule) -> Result<Self, TriggerError> {
        match kind {
            WorkflowKind::MorningCheck | WorkflowKind::DailyReflection | WorkflowKind::WeeklyGrowth => {
                Ok(Self {
                    id: TriggerId::new(),
                    kind,
                    user_id,
                    schedule,
                    enabled: true,
                })
            }
            WorkflowKind::FocusLoop | WorkflowKind::MeetingScheduler => {
                Err(TriggerError::NotSchedulable { kind })
            }
        }
    }

    /// Ledger key of the firing for a local date.
    #[must_use]
    pub fn firing_key(&self, date: NaiveDate) -> String {
        format!("{}:{}:{}", self.kind, self.user_id, date)
    }

    /// Workflow input for the firing on a local date.
    #[must_use]
    pub fn input(&self, date: NaiveDate) -> JsonValue {
        let user_id = self.user_id.as_str();
        let day = date.to_string();
        match self.kind {
            WorkflowKind::MorningCheck => json!({
                "user_id": user_id,
                "date": day,
                "morning_reflection": "Scheduled check-in",
                "energy_level": 3,
                "priorities": ["Focus on high-priority tasks"],
            }),
            WorkflowKind::DailyReflection => json!({
                "user_id": user_id,
                "date": day,
                "reflection_text": "Scheduled reflection",
                "completed_blocks": 0,
                "total_blocks": 0,
                "overall_productivity": 3,
                "wins": [],
                "challenges": [],
            }),
            WorkflowKind::WeeklyGrowth => {
                let week_start = date.checked_sub_days(Days::new(7)).unwrap_or(date);
                json!({
                    "user_id": user_id,
                    "week_start": week_start.to_string(),
                    "week_end": day,
                })
            }
            // Rejected by `new`.
            WorkflowKind::FocusLoop | WorkflowKind::MeetingScheduler => json!({"user_id": user_id}),
        }
    }
}

/// The morning, evening, and weekly triggers every user gets.
///
/// # Errors
///
/// Returns an error only if a built-in expression fails to parse.
pub fn standard_triggers(user_id: &UserId) -> Result<Vec<ScheduledTrigger>, TriggerError> {
    [
        (WorkflowKind::MorningCheck, MORNING_CHECK_CRON),
        (WorkflowKind::DailyReflection, DAILY_REFLECTION_CRON),
        (WorkflowKind::WeeklyGrowth, WEEKLY_GROWTH_CRON),
    ]
    .into_iter()
    .map(|(kind, cron)| ScheduledTrigger::new(kind, user_id.clone(), CronSchedule::parse(cron)?))
    .collect()
}
