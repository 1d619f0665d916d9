use std::fmt::{Display, Formatter};
use std::net::AddrParseError;
use std::sync::PoisonError;

use config::ConfigError;
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

// All except Internal are considered user-facing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    Internal(String),
    /// Rejected configuration. Surfaced when a configuration is applied,
    /// before any state changed.
    Config(String),
    /// Page number outside [0, total_pages).
    OutOfRange { page: usize, total_pages: usize },
    /// The active replacement policy produced no victim even though the
    /// frame array is full.
    NoVictim,
    /// The predictor call failed or timed out. Treated as "no predictions
    /// this access" by the caller.
    PredictorUnavailable(String),
}

impl Error {
    pub fn internal<E: ToString>(msg: E) -> Error {
        Error::Internal(msg.to_string())
    }

    pub fn config<E: ToString>(msg: E) -> Error {
        Error::Config(msg.to_string())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Internal(s) | Error::Config(s) => {
                write!(f, "{}", s)
            }
            Error::OutOfRange { page, total_pages } => {
                write!(f, "page {} out of range [0, {})", page, total_pages)
            }
            Error::NoVictim => {
                write!(f, "no victim frame found")
            }
            Error::PredictorUnavailable(s) => {
                write!(f, "predictor unavailable: {}", s)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::config(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::internal(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::internal(err)
    }
}

impl From<AddrParseError> for Error {
    fn from(err: AddrParseError) -> Self {
        Error::config(err)
    }
}

impl From<log::ParseLevelError> for Error {
    fn from(err: log::ParseLevelError) -> Self {
        Error::config(err)
    }
}

impl From<log::SetLoggerError> for Error {
    fn from(err: log::SetLoggerError) -> Self {
        Error::internal(err)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::internal(err)
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Error::internal(err)
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(err: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::internal(err)
    }
}
