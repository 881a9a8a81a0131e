//! PostgreSQL-backed stores for the workflow engine.
//!
//! This module provides:
//! - Run history (`workflow_events`)
//! - Keyed JSON documents (`documents`)

pub mod documents;
pub mod history;

pub use documents::PgDocumentStore;
pub use history::PgHistoryStore;

/// Returns true if a sqlx error means the database could not be reached.
fn is_connection_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    )
}
