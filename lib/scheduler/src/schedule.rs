//! Calendar schedules in cron notation.
//!
//! Expressions have the five standard fields: `minute hour day-of-month
//! month day-of-week`, with lists, ranges, and steps. Day-of-week counts
//! from Sunday = 0; 7 is accepted as Sunday too. Parsing and occurrence
//! search are done by `croner`.
//!
//! Schedules are evaluated in a fixed UTC offset.

use crate::error::ScheduleError;
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Timelike, Utc};
use croner::Cron;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Windows searched, smallest first, for the latest occurrence before a time.
const LOOKBACK_HOURS: [i64; 5] = [1, 24, 8 * 24, 32 * 24, 367 * 24];

/// A parsed cron schedule.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CronSchedule {
    expression: String,
    cron: Cron,
}

impl CronSchedule {
    /// Parses a five-field expression.
    ///
    /// # Errors
    ///
    /// Returns an error if the field count is wrong or a field is malformed
    /// or out of range.
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let invalid = |reason: String| ScheduleError::InvalidCronExpression {
            expression: expression.to_string(),
            reason,
        };

        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(invalid(format!("expected 5 fields, got {}", parts.len())));
        }
        let expression = parts.join(" ");
        let cron = Cron::new(&expression)
            .parse()
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self { expression, cron })
    }

    /// The expression, with whitespace normalized.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Returns true if the schedule fires at this local minute.
    #[must_use]
    pub fn matches(&self, local: NaiveDateTime) -> bool {
        local
            .with_second(0)
            .and_then(|minute| minute.with_nanosecond(0))
            .is_some_and(|minute| {
                self.cron
                    .is_time_matching(&minute.and_utc())
                    .unwrap_or(false)
            })
    }

    /// First occurrence strictly after `after`.
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>, offset: FixedOffset) -> Option<DateTime<Utc>> {
        self.cron
            .find_next_occurrence(&after.with_timezone(&offset), false)
            .ok()
            .map(|next| next.with_timezone(&Utc))
    }

    /// Latest occurrence at or before `at`, looking back at most a year.
    #[must_use]
    pub fn latest_at_or_before(&self, at: DateTime<Utc>, offset: FixedOffset) -> Option<DateTime<Utc>> {
        let local = at.with_timezone(&offset);
        LOOKBACK_HOURS.iter().find_map(|hours| {
            let mut latest = None;
            let mut cursor = self
                .cron
                .find_next_occurrence(&(local - Duration::hours(*hours)), true)
                .ok();
            while let Some(occurrence) = cursor.filter(|occurrence| *occurrence <= local) {
                latest = Some(occurrence);
                cursor = self.cron.find_next_occurrence(&occurrence, false).ok();
            }
            latest.map(|occurrence| occurrence.with_timezone(&Utc))
        })
    }
}

impl PartialEq for CronSchedule {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl Eq for CronSchedule {}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronSchedule").field(&self.expression).finish()
    }
}

impl FromStr for CronSchedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CronSchedule {
    type Error = ScheduleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CronSchedule> for String {
    fn from(schedule: CronSchedule) -> Self {
        schedule.expression
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}
