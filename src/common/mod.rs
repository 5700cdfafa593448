pub mod constants;
pub mod utility;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Constructs an Error::InvalidInput for the given format string.
#[macro_export]
macro_rules! errinput {
    ($($args:tt)*) => { Err($crate::common::Error::InvalidInput(format!($($args)*)).into()) };
}

/// Constructs an Error::InvalidData for the given format string.
#[macro_export]
macro_rules! errdata {
    ($($args:tt)*) => { Err($crate::common::Error::InvalidData(format!($($args)*)).into()) };
}

/// Constructs an Error::Plan for the given format string.
#[macro_export]
macro_rules! errplan {
    ($($args:tt)*) => { Err($crate::common::Error::Plan(format!($($args)*)).into()) };
}

/// A rustyql error. Errors are serializable so that plans and results can be
/// shipped around together with the failure that ended them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// A statement could not be compiled into a task graph.
    Plan(String),
    /// A source or source type is unknown, or its configuration is invalid.
    Config(String),
    /// A failure recorded by a running task, e.g. a backend read error or a
    /// recovered panic.
    Runtime(String),
    /// The statement or DDL kind is a known extension point without an
    /// implementation.
    NotImplemented(String),
    InvalidInput(String),
    InvalidData(String),
    OutOfBounds,
    OverflowError,
    IO(String),
    Serialization(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Plan(msg) => write!(f, "planning error: {msg}"),
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::Runtime(msg) => write!(f, "runtime error: {msg}"),
            Error::NotImplemented(msg) => write!(f, "not implemented: {msg}"),
            Error::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Error::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Error::OutOfBounds => write!(f, "index out of bounds"),
            Error::OverflowError => write!(f, "arithmetic overflow"),
            Error::IO(msg) => write!(f, "io error: {msg}"),
            Error::Serialization(msg) => write!(f, "serialization error: {msg}"),
        }
    }
}

impl Error {
    /// True for errors that abort compilation before a task graph exists.
    pub fn is_planning(&self) -> bool {
        matches!(self, Error::Plan(_) | Error::Config(_))
    }

    /// True for errors raised while the task graph was running.
    pub fn is_runtime(&self) -> bool {
        matches!(self, Error::Runtime(_))
    }
}

/// A rustyql Result, with the crate error type.
pub type Result<T> = std::result::Result<T, Error>;

impl<T> From<Error> for Result<T> {
    fn from(error: Error) -> Self {
        Err(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IO(err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::IO(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<::config::ConfigError> for Error {
    fn from(err: ::config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Runtime(err.to_string())
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(err: std::num::ParseIntError) -> Self {
        Error::InvalidInput(err.to_string())
    }
}
