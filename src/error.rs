//! Unified error types for the filament path core.
//!
//! A single `Error` enum that every subsystem converts into, so the command
//! boundary in [`KmmsService`](crate::app::service::KmmsService) can decide
//! in one place which failures are reported as text and which propagate.
//!
//! | Kind            | Raised by                              | At the command boundary |
//! |-----------------|----------------------------------------|-------------------------|
//! | `Command`       | bad command arguments, no path         | propagates              |
//! | `Config`        | missing wiring, duplicate names        | propagates (fatal)      |
//! | `Kmms`          | expected operational failures          | reported as text        |
//! | `Motion`        | motion controller rejected a move      | propagates              |

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The command cannot be executed in the current state.
    Command(String),
    /// Wiring or configuration is invalid. Never caught locally.
    Config(String),
    /// Soft operational failure; the operation was abandoned cleanly.
    Kmms(KmmsError),
    /// The motion controller refused or failed a request.
    Motion(String),
}

impl Error {
    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for failures the command boundary reports instead of raising.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::Kmms(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(msg) => write!(f, "command: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Kmms(e) => write!(f, "kmms: {e}"),
            Self::Motion(msg) => write!(f, "motion: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Operational errors
// ---------------------------------------------------------------------------

/// Expected runtime failures of a load/probe operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KmmsError {
    /// Sensors before the driving actuator report no filament.
    PathEmpty,
    /// No sensor usable as a stopping condition exists before the target.
    NoSensors { path: String },
    /// A load target named an item that is not part of the active path.
    UnknownItem { name: String },
    /// A sync context lost contact with its MCU during the probe.
    CommsTimeout,
}

impl fmt::Display for KmmsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PathEmpty => write!(f, "path seems to be empty"),
            Self::NoSensors { path } => {
                write!(f, "{path} does not have any sensors before target configured")
            }
            Self::UnknownItem { name } => write!(f, "'{name}' is not part of the active path"),
            Self::CommsTimeout => write!(f, "communication timeout during probe move"),
        }
    }
}

impl From<KmmsError> for Error {
    fn from(e: KmmsError) -> Self {
        Self::Kmms(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
