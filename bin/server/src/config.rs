//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables. Nested keys
//! use `__`, so `SCHEDULER__GRACE_MINUTES` sets `scheduler.grace_minutes`.

use chrono::{Duration, FixedOffset};
use flowmentor_scheduler::{MissedExecutionBehavior, SchedulerConfig};
use serde::Deserialize;

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection URL. Without one, history and documents live
    /// in memory and are lost on restart.
    #[serde(default)]
    pub database_url: Option<String>,

    /// User that scheduled runs and requests without a `user_id` belong to.
    #[serde(default = "default_user")]
    pub default_user: String,

    #[serde(default)]
    pub timer: TimerConfig,

    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

/// Durable timer polling.
#[derive(Debug, Clone, Deserialize)]
pub struct TimerConfig {
    /// How often due timers and signal deadlines are checked.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Calendar trigger settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Offset of the user's local time from UTC, in minutes.
    #[serde(default)]
    pub utc_offset_minutes: i32,

    #[serde(default = "default_tick_interval_seconds")]
    pub tick_interval_seconds: u64,

    /// How late an occurrence may still fire.
    #[serde(default = "default_grace_minutes")]
    pub grace_minutes: i64,

    #[serde(default)]
    pub missed_execution: MissedExecutionBehavior,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_user() -> String {
    "demo-user".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_tick_interval_seconds() -> u64 {
    30
}

fn default_grace_minutes() -> i64 {
    60
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            utc_offset_minutes: 0,
            tick_interval_seconds: default_tick_interval_seconds(),
            grace_minutes: default_grace_minutes(),
            missed_execution: MissedExecutionBehavior::default(),
        }
    }
}

impl SchedulerSettings {
    /// Converts the settings into the scheduler's evaluation config.
    ///
    /// # Errors
    ///
    /// Returns an error if the offset is a day or more.
    pub fn scheduler_config(&self) -> Result<SchedulerConfig, config::ConfigError> {
        let utc_offset = self
            .utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                config::ConfigError::Message(format!(
                    "scheduler.utc_offset_minutes out of range: {}",
                    self.utc_offset_minutes
                ))
            })?;
        Ok(SchedulerConfig {
            utc_offset,
            grace: Duration::minutes(self.grace_minutes.max(0)),
            missed_execution: self.missed_execution,
        })
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_environment(config::Environment::default())
    }

    fn from_environment(environment: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(environment.separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, config::ConfigError> {
        let source = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ServerConfig::from_environment(config::Environment::default().source(Some(source)))
    }

    #[test]
    fn defaults_apply_without_environment() {
        let config = load(&[]).expect("config");
        assert_eq!(config.bind_addr, "127.0.0.1:3000");
        assert_eq!(config.database_url, None);
        assert_eq!(config.default_user, "demo-user");
        assert_eq!(config.timer.poll_interval_ms, 1000);
        assert!(config.scheduler.enabled);
        assert_eq!(config.scheduler.grace_minutes, 60);
        assert_eq!(config.scheduler.missed_execution, MissedExecutionBehavior::Skip);
    }

    #[test]
    fn nested_keys_use_double_underscore() {
        let config = load(&[
            ("TIMER__POLL_INTERVAL_MS", "250"),
            ("SCHEDULER__ENABLED", "false"),
            ("SCHEDULER__UTC_OFFSET_MINUTES", "-300"),
            ("SCHEDULER__MISSED_EXECUTION", "run_immediately"),
        ])
        .expect("config");
        assert_eq!(config.timer.poll_interval_ms, 250);
        assert!(!config.scheduler.enabled);

        let scheduler = config.scheduler.scheduler_config().expect("scheduler");
        assert_eq!(scheduler.utc_offset.local_minus_utc(), -300 * 60);
        assert_eq!(
            scheduler.missed_execution,
            MissedExecutionBehavior::RunImmediately
        );
    }

    #[test]
    fn offset_of_a_day_is_rejected() {
        let settings = SchedulerSettings {
            utc_offset_minutes: 24 * 60,
            ..SchedulerSettings::default()
        };
        assert!(settings.scheduler_config().is_err());
    }
}
