//! Error types for the batch runner
//!
//! `AppError` covers everything that is fatal to a whole run: bad
//! configuration, malformed request descriptors, unusable credentials and
//! input/output failures. Per-call failures live in
//! [`crate::executor::ExecError`] and never abort a batch.

use thiserror::Error;

/// Application-level error types
///
/// Every variant here stops the run it occurs in. Errors that only affect a
/// single work item or traversal branch are recorded on that item instead.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration value is missing or out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A request descriptor could not be built from the given parts
    #[error("Invalid request descriptor: {0}")]
    InvalidDescriptor(String),

    /// Credentials file is missing, unreadable or holds no token
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// Input records could not be read or parsed
    #[error("Input error: {0}")]
    Input(String),

    /// A result could not be persisted
    #[error("Output error: {0}")]
    Output(String),

    /// Internal error (catch-all for unexpected errors)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
