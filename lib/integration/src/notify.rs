//! Outbound user notifications.

use crate::error::NotifyError;
use async_trait::async_trait;
use flowmentor_core::UserId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::Mutex;

/// A message addressed to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub message: String,
    /// Stable key for the delivery; channels that support it deduplicate on it.
    pub idempotency_key: String,
}

/// Trait for notification channels.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers a notification.
    ///
    /// Sending a notification whose idempotency key was already delivered
    /// succeeds without delivering it again.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification was not delivered.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Notifier that writes each notification to the log once per key.
#[derive(Debug, Default)]
pub struct LogNotifier {
    delivered: Mutex<HashSet<String>>,
}

impl LogNotifier {
    /// Creates a notifier with no deliveries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut delivered = self.delivered.lock().await;
        if !delivered.insert(notification.idempotency_key.clone()) {
            tracing::debug!(key = %notification.idempotency_key, "notification already sent");
            return Ok(());
        }
        tracing::info!(
            user_id = %notification.user_id,
            key = %notification.idempotency_key,
            message = %notification.message,
            "notification sent"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RecordingState {
    sent: Vec<Notification>,
    keys: HashSet<String>,
    failures_left: u32,
    reject_all: bool,
}

/// Notifier that keeps every delivered notification in memory.
///
/// Failures can be injected to exercise retry handling.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    state: Mutex<RecordingState>,
}

impl RecordingNotifier {
    /// Creates a notifier that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a notifier whose first `count` sends fail transiently.
    #[must_use]
    pub fn failing_first(count: u32) -> Self {
        Self {
            state: Mutex::new(RecordingState {
                failures_left: count,
                ..RecordingState::default()
            }),
        }
    }

    /// Creates a notifier that rejects every send.
    #[must_use]
    pub fn rejecting() -> Self {
        Self {
            state: Mutex::new(RecordingState {
                reject_all: true,
                ..RecordingState::default()
            }),
        }
    }

    /// Returns the notifications delivered so far.
    pub async fn sent(&self) -> Vec<Notification> {
        self.state.lock().await.sent.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut state = self.state.lock().await;
        if state.reject_all {
            return Err(NotifyError::Rejected {
                reason: "recipient rejected".to_string(),
            });
        }
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(NotifyError::Unavailable {
                reason: "injected failure".to_string(),
            });
        }
        if state.keys.insert(notification.idempotency_key.clone()) {
            state.sent.push(notification.clone());
        }
        Ok(())
    }
}
