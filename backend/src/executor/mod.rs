//! Request execution module
//!
//! This module turns one request descriptor into one settled outcome. It waits
//! on the shared rate limiter, transmits the request, collects the complete
//! body and classifies the result. It never retries; retry policy belongs to
//! the orchestration layer.

pub mod client;
pub mod error;
pub mod mock;
pub mod transport;

pub use client::{Body, Executor, Payload};
pub use error::ExecError;
pub use mock::{MockTransport, RecordedCall};
pub use transport::{HttpTransport, RawResponse, Transport};
