//! Shared error alias for FlowMentor.
//!
//! Library crates define their own error enums next to the code that raises
//! them. Code at the process edge (startup, background loops) wraps those
//! enums in a rootcause `Report` so context can be attached as the error
//! travels upward.

use rootcause::Report;

/// Result alias carrying a rootcause report.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
