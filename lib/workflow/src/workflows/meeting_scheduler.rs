//! Books a meeting in the earliest window two users share.

use super::{document_key, notify, put_document, unexpected_step};
use crate::definition::{WorkflowDefinition, decode_input};
use crate::kind::WorkflowKind;
use crate::step::{Step, StepHistory};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

/// Collection holding booked meetings, keyed `<user>:<meeting>`.
pub const SCHEDULES_COLLECTION: &str = "schedules";

/// A span of time, start inclusive, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl TimeWindow {
    /// Overlap of two windows, if they share any time.
    #[must_use]
    pub fn overlap(&self, other: &Self) -> Option<Self> {
        let start = self.start_time.max(other.start_time);
        let end = self.end_time.min(other.end_time);
        (start < end).then_some(Self {
            start_time: start,
            end_time: end,
        })
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }
}

/// Input of a meeting scheduling run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingSchedulerInput {
    pub meeting_id: String,
    pub user1_id: String,
    pub user2_id: String,
    pub user1_time_windows: Vec<TimeWindow>,
    pub user2_time_windows: Vec<TimeWindow>,
    pub meeting_duration_minutes: u32,
    pub meeting_title: String,
    #[serde(default)]
    pub meeting_description: Option<String>,
}

/// A booked meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledMeeting {
    pub meeting_id: String,
    pub scheduled_time: TimeWindow,
    pub user1_id: String,
    pub user2_id: String,
    pub title: String,
    pub description: Option<String>,
}

/// Finds the earliest slot of `duration` both users can make.
///
/// Every pair of windows is intersected; overlaps shorter than `duration`
/// are dropped. The winner has the earliest start, then the earliest end,
/// then the lowest input positions. The slot starts with the overlap and
/// lasts exactly `duration`.
#[must_use]
pub fn find_slot(first: &[TimeWindow], second: &[TimeWindow], duration: Duration) -> Option<TimeWindow> {
    let mut best: Option<(DateTime<Utc>, DateTime<Utc>, usize, usize)> = None;
    for (i, a) in first.iter().enumerate() {
        for (j, b) in second.iter().enumerate() {
            let Some(overlap) = a.overlap(b) else {
                continue;
            };
            if overlap.duration() < duration {
                continue;
            }
            let candidate = (overlap.start_time, overlap.end_time, i, j);
            if best.is_none_or(|current| candidate < current) {
                best = Some(candidate);
            }
        }
    }

    let (start, _, _, _) = best?;
    Some(TimeWindow {
        start_time: start,
        end_time: start + duration,
    })
}

/// Meeting scheduler workflow.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeetingScheduler;

impl WorkflowDefinition for MeetingScheduler {
    fn kind(&self) -> &str {
        WorkflowKind::MeetingScheduler.as_str()
    }

    fn next_step(&self, input: &JsonValue, history: &StepHistory) -> Step {
        let input: MeetingSchedulerInput = match decode_input(input) {
            Ok(input) => input,
            Err(step) => return step,
        };
        if input.meeting_duration_minutes == 0 {
            return Step::fail("meeting duration must be positive");
        }

        let duration = Duration::minutes(i64::from(input.meeting_duration_minutes));
        let Some(slot) = find_slot(&input.user1_time_windows, &input.user2_time_windows, duration)
        else {
            return Step::complete(&json!({
                "success": false,
                "scheduled_meeting": null,
                "notified_user1": false,
                "notified_user2": false,
                "message": "No available time slots found for both users",
            }));
        };

        let meeting = ScheduledMeeting {
            meeting_id: input.meeting_id.clone(),
            scheduled_time: slot,
            user1_id: input.user1_id.clone(),
            user2_id: input.user2_id.clone(),
            title: input.meeting_title.clone(),
            description: input.meeting_description.clone(),
        };
        let when = slot.start_time.format("%Y-%m-%d %H:%M UTC").to_string();
        let schedule_entry = |user_id: &str| {
            put_document(
                SCHEDULES_COLLECTION,
                document_key(user_id, &meeting.meeting_id),
                json!({
                    "type": "meeting",
                    "user_id": user_id,
                    "meeting": meeting,
                }),
            )
        };
        let schedule_failure = |step: usize| {
            history
                .failure(step)
                .map(|failure| Step::fail(format!("updating schedules failed: {failure}")))
        };

        match history.len() {
            0 => schedule_entry(&input.user1_id),
            1 => schedule_failure(0).unwrap_or_else(|| schedule_entry(&input.user2_id)),
            2 => schedule_failure(1).unwrap_or_else(|| {
                notify(
                    &input.user1_id,
                    format!("Meeting '{}' booked for {when}", meeting.title),
                )
            }),
            3 => notify(
                &input.user2_id,
                format!("Meeting '{}' booked for {when}", meeting.title),
            ),
            4 => Step::complete(&json!({
                "success": true,
                "scheduled_meeting": meeting,
                "notified_user1": history.succeeded(2),
                "notified_user2": history.succeeded(3),
                "message": format!("Meeting '{}' scheduled successfully for {when}", meeting.title),
            })),
            n => unexpected_step(self.kind(), n),
        }
    }
}
