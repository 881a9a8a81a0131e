//! Calendar triggers for FlowMentor workflows.
//!
//! This crate provides:
//!
//! - **Schedules**: five-field cron expressions evaluated in a fixed offset
//! - **Triggers**: which workflow to start for which user, and with what input
//! - **Firing ledger**: durable claims so each occurrence starts one run
//! - **Scheduler**: the tick loop tying them together

pub mod error;
pub mod ledger;
pub mod schedule;
pub mod scheduler;
pub mod trigger;

pub use error::{ScheduleError, SchedulerError, TriggerError};
pub use ledger::{DocumentFiringLedger, FIRINGS_COLLECTION, Firing, FiringLedger};
pub use schedule::CronSchedule;
pub use scheduler::{Scheduler, SchedulerConfig, TickSummary, WorkflowStarter};
pub use trigger::{MissedExecutionBehavior, ScheduledTrigger, standard_triggers};
