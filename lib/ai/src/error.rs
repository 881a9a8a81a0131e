//! Error types for the AI crate.
//!
//! - `GenerationError`: failures from a text generation backend
//! - `PromptError`: template lookup and rendering failures

use std::fmt;

/// Errors from text generation backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// Backend is unreachable or overloaded.
    Unavailable { reason: String },
    /// Request reached the backend but failed.
    RequestFailed { reason: String },
    /// Rate limit exceeded.
    RateLimited { retry_after_secs: Option<u64> },
    /// The request itself is malformed; retrying will not help.
    InvalidRequest { reason: String },
}

impl GenerationError {
    /// Returns true if the same request may succeed on a later attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidRequest { .. })
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "text generator unavailable: {reason}"),
            Self::RequestFailed { reason } => write!(f, "generation request failed: {reason}"),
            Self::RateLimited { retry_after_secs } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "rate limited, retry after {secs}s")
                } else {
                    write!(f, "rate limited")
                }
            }
            Self::InvalidRequest { reason } => write!(f, "invalid generation request: {reason}"),
        }
    }
}

impl std::error::Error for GenerationError {}

/// Errors from prompt operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    /// Template not found.
    TemplateNotFound { name: String },
    /// Required variables were not supplied.
    MissingVariables {
        template: String,
        variables: Vec<String>,
    },
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TemplateNotFound { name } => write!(f, "prompt template not found: {name}"),
            Self::MissingVariables {
                template,
                variables,
            } => write!(
                f,
                "template '{template}' is missing variables: {}",
                variables.join(", ")
            ),
        }
    }
}

impl std::error::Error for PromptError {}
