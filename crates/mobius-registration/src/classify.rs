//! Classification of failed Mobius calls.
//!
//! Every failure is sorted into one of four categories that decide what the
//! engine does next. The attached [`LineError`] carries the user-facing
//! message for the status; only final errors are ever delivered to the line.
//!
//! | Status / body          | Category         | abort |
//! |------------------------|------------------|-------|
//! | 401                    | final            | true  |
//! | 403, `errorCode` 101   | capacity-limited | false |
//! | 429                    | rate-limited     | false |
//! | anything else          | transient        | false |

use crate::errors::{ErrorType, LineError, MobiusError};
use tracing::warn;

/// `errorCode` on a 403 when every device slot of the user is taken.
pub const DEVICE_LIMIT_EXCEEDED: u32 = 101;
/// `errorCode` on a 403 when the user is not enabled for WebRTC calling.
pub const DEVICE_CREATION_DISABLED: u32 = 102;
/// `errorCode` on a 403 when provisioning the device failed.
pub const DEVICE_CREATION_FAILED: u32 = 103;

/// What kind of failure a Mobius call produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Cannot recover without outside intervention.
    Final,
    /// Device slot occupied by a stale registration that can be reclaimed.
    CapacityLimited,
    /// Server is throttling (429).
    RateLimited,
    /// Worth retrying on the next server or the next tick.
    Transient,
}

impl ErrorCategory {
    /// Label used in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Final => "final",
            ErrorCategory::CapacityLimited => "capacity_limited",
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::Transient => "transient",
        }
    }
}

/// Result of classifying a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    /// Stop the current registration attempt without scheduling retries.
    pub abort_registration: bool,
    pub error: LineError,
}

impl ClassifiedError {
    /// Whether this failure ends the episode.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.category == ErrorCategory::Final
    }
}

/// Classify a failed Mobius call.
#[must_use]
pub fn classify(err: &MobiusError) -> ClassifiedError {
    let status = err.status();

    let (category, error_type, message) = match status {
        Some(401) => (
            ErrorCategory::Final,
            ErrorType::TokenError,
            "User is unauthorized due to an expired token. Sign out, then sign back in.",
        ),
        Some(403) => classify_forbidden(err),
        Some(404) => (
            ErrorCategory::Transient,
            ErrorType::NotFound,
            "The client has unregistered. Please wait for the client to register before attempting the call. If error persists, sign out, sign back in and attempt the call.",
        ),
        Some(429) => (
            ErrorCategory::RateLimited,
            ErrorType::TooManyRequests,
            "Too many requests have been sent. Wait a moment and try again.",
        ),
        Some(500) => (
            ErrorCategory::Transient,
            ErrorType::ServerError,
            "An unknown error occurred while placing the request. Wait a moment and try again.",
        ),
        Some(503) => (
            ErrorCategory::Transient,
            ErrorType::ServiceUnavailable,
            "An error occurred on the server while processing the request. Wait a moment and try again.",
        ),
        _ => (ErrorCategory::Transient, ErrorType::Default, "Unknown error"),
    };

    warn!(
        target: "mobius.registration",
        status = ?status,
        category = category.as_str(),
        error_type = error_type.as_str(),
        error = %err,
        "Mobius request failed"
    );

    ClassifiedError {
        category,
        abort_registration: category == ErrorCategory::Final,
        error: LineError::new(error_type, message, status),
    }
}

fn classify_forbidden(err: &MobiusError) -> (ErrorCategory, ErrorType, &'static str) {
    let Some(body) = err.body() else {
        return (
            ErrorCategory::Transient,
            ErrorType::ForbiddenError,
            "An unauthorized action has been received. This action has been blocked. Please contact the administrator if this persists.",
        );
    };

    match body.error_code {
        Some(DEVICE_LIMIT_EXCEEDED) => (
            ErrorCategory::CapacityLimited,
            ErrorType::ForbiddenError,
            "User device limit exceeded",
        ),
        Some(DEVICE_CREATION_DISABLED) => (
            ErrorCategory::Transient,
            ErrorType::ForbiddenError,
            "User is not configured for WebRTC calling. Please contact the administrator to resolve this issue.",
        ),
        Some(DEVICE_CREATION_FAILED) => (
            ErrorCategory::Transient,
            ErrorType::ForbiddenError,
            "An unknown error occurred while provisioning the device. Wait a moment and try again.",
        ),
        _ => (
            ErrorCategory::Transient,
            ErrorType::ForbiddenError,
            "An unknown error occurred. Wait a moment and try again. Please contact the administrator if the problem persists.",
        ),
    }
}
