//! Run history in PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowmentor_core::WorkflowRunId;
use flowmentor_workflow::{Envelope, HistoryError, HistoryStore, RawEnvelope, RunEvent};
use futures::{StreamExt, TryStreamExt};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Row type for event queries.
#[derive(FromRow)]
struct EventRow {
    event_type: String,
    envelope: serde_json::Value,
}

fn decode(run_id: WorkflowRunId, row: EventRow) -> Result<RunEvent, HistoryError> {
    let corrupt = |reason: String| HistoryError::Corrupt { run_id, reason };
    let raw = RawEnvelope::from_json(row.envelope).map_err(|e| corrupt(e.to_string()))?;
    if raw.version != flowmentor_workflow::CURRENT_VERSION {
        return Err(HistoryError::UnsupportedVersion {
            run_id,
            version: raw.version,
        });
    }
    let event = raw
        .decode::<RunEvent>()
        .map_err(|e| corrupt(format!("{} event: {e}", row.event_type)))?
        .into_payload();
    if event.run_id() != run_id {
        return Err(corrupt(format!("event belongs to {}", event.run_id())));
    }
    Ok(event)
}

fn store_error(e: sqlx::Error) -> HistoryError {
    HistoryError::Unavailable {
        reason: e.to_string(),
    }
}

/// History store over the `workflow_events` table.
#[derive(Debug, Clone)]
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    /// Creates a new store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn append(&self, event: Envelope<RunEvent>) -> Result<(), HistoryError> {
        let payload = event.payload();
        let run_id = payload.run_id();
        let recorded_at: DateTime<Utc> = payload.timestamp();
        let envelope = event.to_json().map_err(|e| HistoryError::Corrupt {
            run_id,
            reason: e.to_string(),
        })?;

        sqlx::query(
            r#"
            INSERT INTO workflow_events (run_id, event_type, envelope, terminal, recorded_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(run_id.to_string())
        .bind(payload.name())
        .bind(envelope)
        .bind(payload.is_terminal())
        .bind(recorded_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn load_events(&self, run_id: WorkflowRunId) -> Result<Vec<RunEvent>, HistoryError> {
        sqlx::query_as::<_, EventRow>(
            r#"
            SELECT event_type, envelope
            FROM workflow_events
            WHERE run_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(run_id.to_string())
        .fetch(&self.pool)
        .map(|row| row.map_err(store_error).and_then(|row| decode(run_id, row)))
        .try_collect()
        .await
    }

    async fn list_unfinished(&self) -> Result<Vec<WorkflowRunId>, HistoryError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT run_id
            FROM (
                SELECT DISTINCT ON (run_id) run_id, terminal
                FROM workflow_events
                ORDER BY run_id, seq DESC
            ) AS last_event
            WHERE NOT terminal
            ORDER BY run_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter()
            .map(|(raw,)| {
                WorkflowRunId::from_str(&raw).map_err(|e| HistoryError::Unavailable {
                    reason: format!("invalid run id '{raw}': {e}"),
                })
            })
            .collect()
    }
}
