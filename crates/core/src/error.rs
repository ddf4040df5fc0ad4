// SPDX-License-Identifier: MIT

//! API-surface error kinds shared by every component.

use thiserror::Error;

/// Stable error kind returned to callers across the transport-agnostic
/// API surface (spec section "Error Handling").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Unknown id.
    NotFound,
    /// Tenant mismatch.
    Forbidden,
    /// Illegal state transition.
    Conflict,
    /// Malformed input, unknown job type, etc.
    Invalid,
    /// Workflow job cap exceeded.
    LimitExceeded,
    /// Executor crash, I/O failure, or other internal fault.
    Internal,
}

crate::simple_display! {
    Kind {
        NotFound => "not_found",
        Forbidden => "forbidden",
        Conflict => "conflict",
        Invalid => "invalid",
        LimitExceeded => "limit_exceeded",
        Internal => "internal",
    }
}

/// A classified API error: a stable [`Kind`] plus a human-readable message.
///
/// Internal executor errors are never raised through this type to the
/// admission layer — they are recorded on the job record instead and
/// surfaced as the FAILED transition's `reason`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: Kind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: Kind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Kind::NotFound, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(Kind::Forbidden, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(Kind::Conflict, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(Kind::Invalid, message)
    }

    pub fn limit_exceeded(message: impl Into<String>) -> Self {
        Self::new(Kind::LimitExceeded, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Kind::Internal, message)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
