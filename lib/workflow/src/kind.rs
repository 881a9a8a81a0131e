//! The workflows FlowMentor ships.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the built-in workflow kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    /// Morning planning: generates and stores the day plan.
    MorningCheck,
    /// One focus block with start/end notifications and a feedback wait.
    FocusLoop,
    /// End-of-day reflection summary.
    DailyReflection,
    /// Weekly review with micro-goal selection.
    WeeklyGrowth,
    /// Finds a common slot for two users and books it.
    MeetingScheduler,
}

impl WorkflowKind {
    /// All built-in kinds.
    pub const ALL: [Self; 5] = [
        Self::MorningCheck,
        Self::FocusLoop,
        Self::DailyReflection,
        Self::WeeklyGrowth,
        Self::MeetingScheduler,
    ];

    /// Returns the canonical snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MorningCheck => "morning_check",
            Self::FocusLoop => "focus_loop",
            Self::DailyReflection => "daily_reflection",
            Self::WeeklyGrowth => "weekly_growth",
            Self::MeetingScheduler => "meeting_scheduler",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names no built-in workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownWorkflowKind {
    pub name: String,
}

impl fmt::Display for UnknownWorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown workflow kind: {}", self.name)
    }
}

impl std::error::Error for UnknownWorkflowKind {}

impl FromStr for WorkflowKind {
    type Err = UnknownWorkflowKind;

    /// Accepts `morning_check`, `morning-check`, and `MorningCheck` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().replace('_', "") == normalized)
            .ok_or_else(|| UnknownWorkflowKind {
                name: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_spellings() {
        assert_eq!("focus_loop".parse(), Ok(WorkflowKind::FocusLoop));
        assert_eq!("FocusLoop".parse(), Ok(WorkflowKind::FocusLoop));
        assert_eq!("weekly-growth".parse(), Ok(WorkflowKind::WeeklyGrowth));
    }

    #[test]
    fn rejects_unknown_names() {
        let err = "lunch".parse::<WorkflowKind>().unwrap_err();
        assert_eq!(err.name, "lunch");
    }

    #[test]
    fn names_round_trip() {
        for kind in WorkflowKind::ALL {
            assert_eq!(kind.as_str().parse(), Ok(kind));
            let json = serde_json::to_value(kind).expect("serialize");
            assert_eq!(json, kind.as_str());
        }
    }
}
