//! Strongly typed identifiers.
//!
//! Identifiers minted by FlowMentor itself (runs, triggers) are ULIDs so
//! they sort by creation time. User identifiers come from outside the engine
//! and are kept as opaque strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Generates a prefixed ULID wrapper.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new ID with a randomly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Creates an ID from a ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }

            /// Returns the prefix used for display formatting.
            #[must_use]
            pub const fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let ulid_str = s
                    .strip_prefix(concat!($prefix, "_"))
                    .unwrap_or(s);

                Ulid::from_str(ulid_str)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        reason: e.to_string(),
                    })
            }
        }

        impl From<Ulid> for $name {
            fn from(ulid: Ulid) -> Self {
                Self(ulid)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a single execution (run) of a workflow.
    WorkflowRunId,
    "run"
);

define_id!(
    /// Unique identifier for a scheduled trigger.
    TriggerId,
    "trg"
);

/// Identifier of the user owning a run.
///
/// FlowMentor runs with a single configured user, but every run and every
/// stored document is still keyed by user so the data model stays ready for
/// more.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a user ID from any non-empty string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is empty or only whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, ParseIdError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ParseIdError {
                id_type: "UserId",
                reason: "user id must not be empty".to_string(),
            });
        }
        Ok(Self(value))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_display_format() {
        let id = WorkflowRunId::new();
        assert!(id.to_string().starts_with("run_"));
    }

    #[test]
    fn parse_with_and_without_prefix() {
        let id = WorkflowRunId::new();
        let parsed: WorkflowRunId = id.to_string().parse().expect("should parse");
        assert_eq!(id, parsed);

        let raw: WorkflowRunId = id.as_ulid().to_string().parse().expect("should parse");
        assert_eq!(id, raw);
    }

    #[test]
    fn parse_invalid_ulid() {
        let err = "run_not-a-ulid".parse::<WorkflowRunId>().unwrap_err();
        assert_eq!(err.id_type, "WorkflowRunId");
    }

    #[test]
    fn run_ids_sort_by_creation() {
        let first = WorkflowRunId::from_ulid(Ulid::from_parts(1, 0));
        let second = WorkflowRunId::from_ulid(Ulid::from_parts(2, 0));
        assert!(first < second);
    }

    #[test]
    fn user_id_rejects_blank() {
        assert!(UserId::new("   ").is_err());
        let user = UserId::new("demo-user").expect("valid user");
        assert_eq!(user.as_str(), "demo-user");
        assert_eq!(user.to_string(), "demo-user");
    }

    #[test]
    fn user_id_serializes_as_plain_string() {
        let user = UserId::new("demo-user").expect("valid user");
        let json = serde_json::to_string(&user).expect("serialize");
        assert_eq!(json, "\"demo-user\"");
    }
}
