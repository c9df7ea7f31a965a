//! Shared types for launchlog
//!
//! This crate contains data structures used across multiple launchlog crates.

use serde::{Deserialize, Serialize};

// ============================================================================
// Log Types
// ============================================================================

/// Severity of a console line.
///
/// The declaration order is the total order used for comparisons:
/// `Unknown < StdOut < StdErr < Launcher < Trace < ... < Fatal`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// No idea what this is or where it came from
    #[default]
    Unknown,
    /// Untagged line from the process' stdout
    StdOut,
    /// Untagged line from the process' stderr
    StdErr,
    /// Lines synthesized by the launcher itself
    Launcher,
    Trace,
    Debug,
    Info,
    Message,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// Case-insensitive lookup of a level name.
    ///
    /// The raw channel severities (`StdOut`, `StdErr`) have no name and are
    /// never produced here.
    pub fn from_name(name: &str) -> Self {
        match name.to_uppercase().as_str() {
            "LAUNCHER" => Self::Launcher,
            "TRACE" => Self::Trace,
            "DEBUG" => Self::Debug,
            "INFO" => Self::Info,
            "MESSAGE" => Self::Message,
            "WARNING" | "WARN" => Self::Warning,
            "ERROR" | "CRITICAL" => Self::Error,
            "FATAL" => Self::Fatal,
            _ => Self::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        *self != Self::Unknown
    }

    /// Upper-case name, as used in the `!![LEVEL]!` line marker
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::StdOut => "STDOUT",
            Self::StdErr => "STDERR",
            Self::Launcher => "LAUNCHER",
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Message => "MESSAGE",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }

    /// Short display string (3 chars)
    pub fn short(&self) -> &'static str {
        match self {
            Self::Unknown => "???",
            Self::StdOut => "OUT",
            Self::StdErr => "ERR",
            Self::Launcher => "LCH",
            Self::Trace => "TRC",
            Self::Debug => "DBG",
            Self::Info => "INF",
            Self::Message => "MSG",
            Self::Warning => "WRN",
            Self::Error => "ERR",
            Self::Fatal => "FTL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    /// Like [`Severity::from_name`], but also accepts the channel names and
    /// rejects anything unrecognised. Used for CLI and config input.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "stdout" => Ok(Self::StdOut),
            "stderr" => Ok(Self::StdErr),
            other => match Self::from_name(other) {
                Self::Unknown => Err(format!("unknown severity '{}'", s)),
                level => Ok(level),
            },
        }
    }
}

/// Output channel of an external process
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Stdout,
    Stderr,
}

impl Channel {
    /// Severity assigned to untagged lines from this channel
    pub fn severity(&self) -> Severity {
        match self {
            Self::Stdout => Severity::StdOut,
            Self::Stderr => Severity::StdErr,
        }
    }

    /// Map a raw channel severity back to its channel
    pub fn from_severity(severity: Severity) -> Option<Self> {
        match severity {
            Severity::StdOut => Some(Self::Stdout),
            Severity::StdErr => Some(Self::Stderr),
            _ => None,
        }
    }
}

/// A stored console line
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedLine {
    pub severity: Severity,
    pub text: String,
}

impl ClassifiedLine {
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
        }
    }
}

// ============================================================================
// Launch Types
// ============================================================================

/// Lifecycle state of a launch pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PipelineState {
    #[default]
    NotStarted,
    Running,
    /// A step is blocked until `proceed()` is called
    Waiting,
    Finished,
    Failed,
    Aborted,
}

impl PipelineState {
    /// Finished, Failed and Aborted admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Aborted)
    }
}

/// Lifecycle signal published by a pipeline to its observers
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineEvent {
    Started,
    StepChanged { index: usize, name: String },
    /// The current step is waiting for `proceed()`
    AwaitingProceed { index: usize },
    Succeeded,
    Failed { reason: String },
    Aborted,
}

/// Final result of one launch attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineOutcome {
    Succeeded,
    Failed(String),
    Aborted(String),
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Reason surfaced to the caller for an unsuccessful launch
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Succeeded => None,
            Self::Failed(reason) | Self::Aborted(reason) => Some(reason),
        }
    }
}
