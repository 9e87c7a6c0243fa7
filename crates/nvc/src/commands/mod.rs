//! Command handlers for the nvc CLI.
//!
//! Handlers print their result to stdout; diagnostics go through tracing
//! to stderr.

pub mod diff;
pub mod history;
pub mod logging;
pub mod snapshot;

pub use diff::*;
pub use history::*;
pub use logging::*;
pub use snapshot::*;
