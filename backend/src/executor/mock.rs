//! In-memory transport
//!
//! Answers requests from a closure instead of the network, with optional
//! latency, and records every call. Used by the test suites and for dry runs.

use crate::executor::error::ExecError;
use crate::executor::transport::{RawResponse, Transport};
use crate::request::RequestDescriptor;
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

type Responder = dyn Fn(&RequestDescriptor) -> Result<RawResponse, ExecError> + Send + Sync;

/// One call seen by a [`MockTransport`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Rendered request URL
    pub url: String,
    /// When the call reached the transport
    pub at: Instant,
}

/// Transport answering from a closure
pub struct MockTransport {
    responder: Box<Responder>,
    latency: Duration,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    /// Answer every request with `responder`
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&RequestDescriptor) -> Result<RawResponse, ExecError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Delay every response by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Calls seen so far, in arrival order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Number of calls seen so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or_default()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, descriptor: &RequestDescriptor) -> Result<RawResponse, ExecError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                url: descriptor.url().to_string(),
                at: Instant::now(),
            });
        }

        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }

        (self.responder)(descriptor)
    }
}
