//! Log processing for launchlog
//!
//! This crate turns raw process output into classified console lines:
//! level classification, incremental log4j XML parsing, privacy filtering,
//! line splitting and a bounded console buffer.

mod buffer;
mod censor;
mod filter;
pub mod level;
mod lines;
mod parser;

pub use buffer::{DEFAULT_MAX_LINES, LevelCounts, LogBuffer};
pub use censor::PrivacyFilter;
pub use filter::LogFilter;
pub use lines::LineSplitter;
pub use parser::{LogEvent, LogParser, ParseError, ParseErrorKind, ParsedItem};

// Re-export types used in our public API
pub use launchlog_types::{ClassifiedLine, Severity};
