//! Error types for the server.
//!
//! Handlers return [`ApiError`]; its `IntoResponse` impl picks the status
//! code and keeps internal details out of the response body. Startup
//! failures are [`StartupError`]s wrapped in a rootcause report.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use flowmentor_workflow::RunnerError;
use serde_json::json;
use std::fmt;

/// Errors surfaced by the workflow API.
#[derive(Debug)]
pub enum ApiError {
    /// No workflow is registered under this kind.
    UnknownKind { kind: String },
    /// No run with this ID exists.
    RunNotFound { run_id: String },
    /// The request could not be understood.
    BadRequest { reason: String },
    /// The input names a different user than the request.
    UserMismatch { requested: String, input: String },
    /// Something failed on our side.
    Internal { details: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKind { kind } => write!(f, "unknown workflow kind '{kind}'"),
            Self::RunNotFound { run_id } => write!(f, "workflow run '{run_id}' not found"),
            Self::BadRequest { reason } => write!(f, "bad request: {reason}"),
            Self::UserMismatch { requested, input } => write!(
                f,
                "input user_id {input} does not match requested user '{requested}'"
            ),
            Self::Internal { details } => write!(f, "internal error: {details}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::UnknownKind { .. } | Self::RunNotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::UserMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RunnerError> for ApiError {
    fn from(e: RunnerError) -> Self {
        match e {
            RunnerError::UnknownWorkflowKind { kind } => Self::UnknownKind { kind },
            RunnerError::RunNotFound { run_id } => Self::RunNotFound {
                run_id: run_id.to_string(),
            },
            other => Self::Internal {
                details: other.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal { details } => {
                tracing::error!(%details, "request failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Errors that stop the server from starting or serving.
#[derive(Debug)]
pub enum StartupError {
    /// Configuration was missing or invalid.
    Config { reason: String },
    /// The database could not be reached or migrated.
    Database { reason: String },
    /// Unfinished runs could not be restored.
    Recovery { reason: String },
    /// The scheduler triggers could not be built.
    Triggers { reason: String },
    /// The listener could not be bound or failed while serving.
    Serve { reason: String },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { reason } => write!(f, "invalid configuration: {reason}"),
            Self::Database { reason } => write!(f, "database setup failed: {reason}"),
            Self::Recovery { reason } => write!(f, "recovering workflow runs failed: {reason}"),
            Self::Triggers { reason } => write!(f, "building scheduled triggers failed: {reason}"),
            Self::Serve { reason } => write!(f, "server error: {reason}"),
        }
    }
}

impl std::error::Error for StartupError {}
