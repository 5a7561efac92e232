//! Mobius registration error types.
//!
//! `MobiusError` is what every collaborator call fails with. `LineError` is the
//! consumer-facing error carried by `LineEvent::Error`; it never contains URLs
//! or response bodies, those are logged server-side only.

use crate::models::ErrorBody;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failure of a call to a Mobius server.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MobiusError {
    /// The server answered with a non-2xx status.
    #[error("Mobius returned HTTP {status}")]
    Http {
        status: u16,
        /// Error body, when it parsed as the Mobius error shape.
        body: Option<ErrorBody>,
    },

    /// The request never produced a response (connect failure, timeout, ...).
    #[error("Transport error: {0}")]
    Transport(String),

    /// A 2xx response whose body could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl MobiusError {
    /// HTTP status of the failure, if the server answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            MobiusError::Http { status, .. } => Some(*status),
            MobiusError::Transport(_) | MobiusError::InvalidResponse(_) => None,
        }
    }

    /// Parsed error body, if any.
    #[must_use]
    pub fn body(&self) -> Option<&ErrorBody> {
        match self {
            MobiusError::Http { body, .. } => body.as_ref(),
            MobiusError::Transport(_) | MobiusError::InvalidResponse(_) => None,
        }
    }

    /// Shorthand for an HTTP failure without a body.
    #[must_use]
    pub fn http(status: u16) -> Self {
        MobiusError::Http { status, body: None }
    }
}

/// Kind of error surfaced to the line owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Credentials expired; the user has to sign in again.
    TokenError,
    /// Request rejected by policy or provisioning.
    ForbiddenError,
    /// Device registration no longer exists on the server.
    NotFound,
    /// Server side failure while processing the request.
    ServerError,
    /// Mobius is unavailable, including exhausted failover.
    ServiceUnavailable,
    /// Mobius is throttling this client.
    TooManyRequests,
    /// Anything else.
    Default,
}

impl ErrorType {
    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::TokenError => "token_error",
            ErrorType::ForbiddenError => "forbidden_error",
            ErrorType::NotFound => "not_found",
            ErrorType::ServerError => "server_error",
            ErrorType::ServiceUnavailable => "service_unavailable",
            ErrorType::TooManyRequests => "too_many_requests",
            ErrorType::Default => "default",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error delivered with `LineEvent::Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{error_type}: {message}")]
pub struct LineError {
    pub error_type: ErrorType,
    /// User-facing message.
    pub message: String,
    /// HTTP status that caused the error, when there was one.
    pub status: Option<u16>,
}

impl LineError {
    #[must_use]
    pub fn new(error_type: ErrorType, message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            error_type,
            message: message.into(),
            status,
        }
    }

    /// Error emitted once primary and backup servers are exhausted.
    #[must_use]
    pub fn final_failure() -> Self {
        Self::new(
            ErrorType::ServiceUnavailable,
            "An unknown error occurred. Wait a moment and try again. Please contact the administrator if the problem persists.",
            None,
        )
    }
}
