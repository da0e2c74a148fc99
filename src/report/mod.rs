//! Summaries of the trace lines printed by instrumented programs.
//!
//! The instrumented program reports every counter update through the trace sink. On a device
//! these lines end up in `logcat`, interleaved with unrelated output. This module extracts the
//! records ([`TraceRecord`]), keeps the latest value of each counter and takes periodic
//! [`Snapshot`]s so counter growth over time can be inspected.
//!
//! # Examples
//!
//! ```rust
//! use heapscope::report::{summarize, Operation, ReportConfig};
//!
//! let log = "10-16 12:00:00.000 1 1 I HEAPSCOPE: a.Foo writes counter = 1\n\
//!            10-16 12:00:12.000 1 1 I HEAPSCOPE: a.Foo writes counter = 9\n";
//! let summary = summarize(log, ReportConfig::default());
//! assert_eq!(summary.latest_value("a.Foo", Operation::Write), Some(9));
//! assert_eq!(summary.snapshots.len(), 1);
//! ```

mod record;
mod summary;

pub use record::{Operation, Timestamp, TraceRecord};
pub use summary::{summarize, CounterEntry, LogSummarizer, ReportConfig, Snapshot, Summary};
