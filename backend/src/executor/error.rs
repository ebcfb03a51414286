//! Execution-specific error types
//!
//! Errors that can occur while executing a single request (transport
//! failures, error statuses, undecodable bodies, deadlines, etc.)

use crate::limiter::AcquireError;
use thiserror::Error;

/// Errors that can occur during request execution
///
/// Messages are captured as strings so outcomes can be cloned into item state
/// and result aggregates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// Connection-level failure (DNS, TLS, reset, body read failure)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote answered with a non-success status code
    #[error("HTTP status {status}: {body}")]
    Status {
        /// Status code returned by the remote
        status: u16,
        /// Response body, as returned
        body: String,
    },

    /// The body could not be decoded as the expected format
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The request did not settle before its deadline
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// The remote rejected the credentials
    #[error("Authorization failed (HTTP {status}): {body}")]
    Auth {
        /// Status code returned by the remote (401 or 403)
        status: u16,
        /// Response body, as returned
        body: String,
    },

    /// The request never got a limiter token
    #[error("Request cancelled: {0}")]
    Cancelled(#[from] AcquireError),
}

impl ExecError {
    /// HTTP status attached to the error, if the remote answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ExecError::Status { status, .. } | ExecError::Auth { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Failures that say nothing about the request itself
    pub fn is_transient(&self) -> bool {
        matches!(self, ExecError::Transport(_) | ExecError::Timeout(_))
    }
}
