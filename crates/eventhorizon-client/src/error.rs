use std::time::Duration;

use thiserror::Error;

use eventhorizon_wire::{ConflictError, ErrorResponse};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Client error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Decoding error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Decoding error: stream line is not UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Service error: {0}")]
    Service(ErrorResponse),

    #[error("Not found: {0}")]
    NotFound(ErrorResponse),

    #[error("Conflict: {0}")]
    Conflict(Box<ConflictError>),

    #[error("Cancelled")]
    Cancelled,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    pub fn conflict(&self) -> Option<&ConflictError> {
        match self {
            Error::Conflict(conflict) => Some(conflict),
            _ => None,
        }
    }

    pub fn into_conflict(self) -> Option<ConflictError> {
        match self {
            Error::Conflict(conflict) => Some(*conflict),
            _ => None,
        }
    }

    /// Only network-level failures are worth another attempt.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Status code the server answered with, when there was an answer.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Service(response) | Error::NotFound(response) => Some(response.response_code),
            Error::Conflict(conflict) => Some(conflict.response_code),
            Error::Transport(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    /// Short machine-readable tag for observability events.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Transport(_) => "transport",
            Error::Decode(_) | Error::InvalidUtf8(_) => "decode",
            Error::Service(_) => "service",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::Cancelled => "cancelled",
            Error::InvalidRequest(_) => "invalid_request",
            Error::ShutdownTimeout(_) => "shutdown_timeout",
        }
    }
}

impl From<ConflictError> for Error {
    fn from(conflict: ConflictError) -> Self {
        Error::Conflict(Box::new(conflict))
    }
}
