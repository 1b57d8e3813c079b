//! Custom error types for the fixture controller.
//!
//! This module defines the primary error type, `FixtureError`, used across the link
//! engine, the test sequence and the bootstrap code. Using the `thiserror` crate, it
//! gives a single place to reason about what can fail and how callers should react.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically a malformed TOML file or an
//!   environment override that does not fit the expected type.
//! - **`Configuration`**: Semantic errors in otherwise well-formed configuration (missing
//!   port, unsupported parity, a pin used as input and output). Fatal at startup.
//! - **`ChannelOpen`**: The serial device could not be opened (busy, permission denied,
//!   not present).
//! - **`Io`**: Wraps `std::io::Error`. Inside the reader and writer loops these are logged
//!   and swallowed; they only surface from one-shot operations.
//! - **`DuplicateTask`**: A periodic task was registered under a name that is still live.
//! - **`Flash`**: The flashing tool failed; carries a typed [`FlashFailure`].
//! - **`TestTimeout`**: A test step waited for an event that never arrived.
//! - **`Gpio`**: A fixture pin could not be exported, configured, read or driven.
//! - **`LinkClosed`**: The serial link was used after `close()`.
//!
//! By using `#[from]`, `FixtureError` can be created from underlying error types,
//! so the `?` operator works across module boundaries.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the fixture error type.
pub type FixtureResult<T> = std::result::Result<T, FixtureError>;

#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Failed to open serial port '{port}': {reason}")]
    ChannelOpen { port: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task '{0}' is already registered")]
    DuplicateTask(String),

    #[error("Delivery mode error: {0}")]
    DeliveryMode(String),

    #[error("Flashing failed: {0}")]
    Flash(#[from] FlashFailure),

    #[error("Timed out after {waited:?} waiting for '{event}'")]
    TestTimeout { event: String, waited: Duration },

    #[error("Serial link is closed")]
    LinkClosed,

    #[error("GPIO {pin}: {source}")]
    Gpio {
        pin: u8,
        #[source]
        source: std::io::Error,
    },
}

impl From<figment::Error> for FixtureError {
    fn from(value: figment::Error) -> Self {
        FixtureError::Config(Box::new(value))
    }
}

/// Why a flashing attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashFailureKind {
    /// The image or the tool itself could not be found.
    ToolMissing,
    /// The tool ran and exited unsuccessfully.
    ToolFailed { code: Option<i32> },
    /// The tool process could not be started.
    Spawn(String),
}

impl std::fmt::Display for FlashFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlashFailureKind::ToolMissing => write!(f, "tool or image missing"),
            FlashFailureKind::ToolFailed { code: Some(code) } => {
                write!(f, "tool exited with status {}", code)
            }
            FlashFailureKind::ToolFailed { code: None } => write!(f, "tool terminated by signal"),
            FlashFailureKind::Spawn(msg) => write!(f, "could not start tool: {}", msg),
        }
    }
}

/// A failed flashing attempt with the output the tool produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}")]
pub struct FlashFailure {
    pub kind: FlashFailureKind,
    pub stdout: String,
    pub stderr: String,
}

impl FlashFailure {
    pub fn new(kind: FlashFailureKind) -> Self {
        Self {
            kind,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Last non-empty line of stderr, falling back to stdout.
    ///
    /// OpenOCD prints its verdict last, so this is what ends up on the HMI.
    pub fn summary(&self) -> String {
        let last_line = |text: &str| {
            text.lines()
                .rev()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(str::to_string)
        };
        last_line(&self.stderr)
            .or_else(|| last_line(&self.stdout))
            .unwrap_or_else(|| self.kind.to_string())
    }
}

impl FixtureError {
    /// Whether the sequence can carry on after this error.
    pub fn is_recoverable(&self) -> bool {
        match self {
            FixtureError::Io(_)
            | FixtureError::Flash(_)
            | FixtureError::TestTimeout { .. }
            | FixtureError::Gpio { .. }
            | FixtureError::DuplicateTask(_)
            | FixtureError::DeliveryMode(_) => true,
            FixtureError::Config(_)
            | FixtureError::Configuration(_)
            | FixtureError::ChannelOpen { .. }
            | FixtureError::LinkClosed => false,
        }
    }
}
