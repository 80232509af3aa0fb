//! Error types for the rowcursor client library

use std::fmt;
use std::panic::Location;
use std::string::FromUtf8Error;

use thiserror::Error;

use crate::driver::{DriverCall, ReturnCode};

/// Result type alias for rowcursor client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Source location of the operation that issued a failing driver call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    pub file: &'static str,
    pub line: u32,
}

impl CallSite {
    /// Capture the location of the caller of the enclosing `#[track_caller]` function
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self {
            file: location.file(),
            line: location.line(),
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file, self.line)
    }
}

/// Steps of the connection handshake, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    AllocateEnvironment,
    SetEnvironmentAttribute,
    AllocateConnection,
    DriverConnect,
}

impl HandshakeStep {
    /// The driver call this step is made of
    pub fn call(self) -> DriverCall {
        match self {
            HandshakeStep::AllocateEnvironment => DriverCall::AllocateEnvironment,
            HandshakeStep::SetEnvironmentAttribute => DriverCall::SetEnvironmentAttribute,
            HandshakeStep::AllocateConnection => DriverCall::AllocateConnection,
            HandshakeStep::DriverConnect => DriverCall::DriverConnect,
        }
    }
}

impl fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.call(), f)
    }
}

/// Errors that can occur when using the rowcursor client
#[derive(Debug, Error)]
pub enum Error {
    /// A step of the connection handshake failed
    #[error("Failed to connect: {step} returned {code} at {location}")]
    Connection {
        step: HandshakeStep,
        code: ReturnCode,
        location: CallSite,
    },

    /// A driver call failed outside the handshake
    #[error("Driver call {call} returned {code} at {location}")]
    Driver {
        call: DriverCall,
        code: ReturnCode,
        location: CallSite,
    },

    /// No column carries the requested name
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Column index outside `0..count`
    #[error("Column index {index} out of range (result has {count} columns)")]
    ColumnOutOfRange { index: usize, count: usize },

    /// Operation on a session or cursor that was closed or moved from
    #[error("{0} is closed")]
    Closed(&'static str),

    /// Feature accepted by the API but not implemented
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Text column data that is not valid UTF-8
    #[error("Column {column} does not hold valid UTF-8 text")]
    InvalidText {
        column: usize,
        #[source]
        source: FromUtf8Error,
    },

    /// Configuration could not be loaded or is invalid
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    #[track_caller]
    pub(crate) fn driver(call: DriverCall, code: ReturnCode) -> Self {
        Error::Driver {
            call,
            code,
            location: CallSite::caller(),
        }
    }

    #[track_caller]
    pub(crate) fn connection(step: HandshakeStep, code: ReturnCode) -> Self {
        Error::Connection {
            step,
            code,
            location: CallSite::caller(),
        }
    }

    /// The driver call that failed, if this error came from the driver
    pub fn failed_call(&self) -> Option<DriverCall> {
        match self {
            Error::Connection { step, .. } => Some(step.call()),
            Error::Driver { call, .. } => Some(*call),
            _ => None,
        }
    }

    /// The call-site tag, if this error came from the driver
    pub fn location(&self) -> Option<CallSite> {
        match self {
            Error::Connection { location, .. } | Error::Driver { location, .. } => Some(*location),
            _ => None,
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Config(e.to_string())
    }
}
