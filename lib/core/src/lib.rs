//! Core types shared by every FlowMentor crate.
//!
//! This crate provides the strongly typed identifiers used across the
//! workflow engine and the `Result` alias built on rootcause.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, TriggerId, UserId, WorkflowRunId};
