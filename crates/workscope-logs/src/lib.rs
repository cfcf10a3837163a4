//! Pod log retrieval for workscope
//!
//! The log API can bound a read by start time or by line count but not by
//! a time window combined with a line count. This crate reads from the
//! start time, then applies the window end and the tail limit client side.

mod error;
mod fetch;
mod options;
mod parser;

pub use error::LogError;
pub use fetch::get_pod_logs;
pub use options::{LogOptions, parse_duration};
pub use parser::LogParser;

// Re-export types used in our public API
pub use workscope_types::{LogEntry, Severity};
