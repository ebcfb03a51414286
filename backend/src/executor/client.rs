//! Rate-limited request executor
//!
//! One call to [`Executor::execute`] is one unit of work: take a limiter token,
//! transmit, collect the full body, classify. The outcome is always returned as
//! a `Result`; nothing is retried here.

use crate::executor::error::ExecError;
use crate::executor::transport::{RawResponse, Transport};
use crate::limiter::RateLimiter;
use crate::request::{RequestDescriptor, ResponseFormat};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// Response body after decoding
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Decoded JSON document
    Json(Value),
    /// Body text, as received
    Text(String),
}

/// Successful response
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    /// HTTP status code (always 2xx)
    pub status: u16,
    /// Response body
    pub body: Body,
}

impl Payload {
    /// The decoded document, if the body was JSON
    pub fn document(&self) -> Option<&Value> {
        match &self.body {
            Body::Json(value) => Some(value),
            Body::Text(_) => None,
        }
    }

    /// The body as a JSON value (text bodies become a JSON string)
    pub fn to_value(&self) -> Value {
        match &self.body {
            Body::Json(value) => value.clone(),
            Body::Text(text) => Value::String(text.clone()),
        }
    }

    /// Consume the payload, returning the body as a JSON value
    pub fn into_value(self) -> Value {
        match self.body {
            Body::Json(value) => value,
            Body::Text(text) => Value::String(text),
        }
    }
}

/// Executes descriptors against a transport, one limiter token per call
pub struct Executor {
    limiter: RateLimiter,
    transport: Arc<dyn Transport>,
    timeout: Duration,
    log_status: bool,
}

impl Executor {
    /// Create an executor with a 30 second deadline and status logging off
    pub fn new(limiter: RateLimiter, transport: Arc<dyn Transport>) -> Self {
        Self {
            limiter,
            transport,
            timeout: Duration::from_secs(30),
            log_status: false,
        }
    }

    /// Set the default per-call deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Log the status of every call at `info`
    pub fn with_status_logging(mut self, log_status: bool) -> Self {
        self.log_status = log_status;
        self
    }

    /// The shared limiter
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Get the default deadline
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute with the default deadline
    pub async fn execute(&self, descriptor: &RequestDescriptor) -> Result<Payload, ExecError> {
        self.execute_with_deadline(descriptor, self.timeout).await
    }

    /// Execute one request
    ///
    /// The deadline starts once the limiter has granted a token, so time spent
    /// queueing behind other calls never counts against it.
    ///
    /// # Errors
    /// * `ExecError::Cancelled` if the limiter shut down before granting
    /// * `ExecError::Timeout` if the response did not complete in time
    /// * `ExecError::Transport` for connection-level failures
    /// * `ExecError::Auth` for 401/403, `ExecError::Status` for other non-2xx
    /// * `ExecError::Decode` if a JSON body could not be parsed
    pub async fn execute_with_deadline(
        &self,
        descriptor: &RequestDescriptor,
        deadline: Duration,
    ) -> Result<Payload, ExecError> {
        self.limiter.acquire().await?;

        let raw = match timeout(deadline, self.transport.send(descriptor)).await {
            Ok(result) => result.inspect_err(|e| {
                warn!(request = %descriptor, error = %e, "Request failed");
            })?,
            Err(_) => {
                warn!(
                    request = %descriptor,
                    timeout_ms = deadline.as_millis() as u64,
                    "Request timed out"
                );
                return Err(ExecError::Timeout(deadline.as_millis() as u64));
            }
        };

        if self.log_status {
            info!(request = %descriptor, status = raw.status, "Request completed");
        } else {
            debug!(
                request = %descriptor,
                status = raw.status,
                body_len = raw.body.len(),
                "Request completed"
            );
        }

        Self::classify(raw, descriptor.format())
    }

    fn classify(raw: RawResponse, format: ResponseFormat) -> Result<Payload, ExecError> {
        let RawResponse { status, body } = raw;

        match status {
            401 | 403 => return Err(ExecError::Auth { status, body }),
            200..=299 => {}
            _ => return Err(ExecError::Status { status, body }),
        }

        let body = match format {
            ResponseFormat::Raw => Body::Text(body),
            ResponseFormat::Json => {
                let value: Value = serde_json::from_str(&body).map_err(|e| {
                    ExecError::Decode(format!("{} - Response body: {}", e, truncate(&body)))
                })?;
                Body::Json(value)
            }
        };

        Ok(Payload { status, body })
    }
}

fn truncate(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let head: String = body.chars().take(MAX).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockTransport;
    use crate::limiter::LimiterConfig;
    use crate::request::DescriptorBuilder;
    use serde_json::json;
    use tokio::time::Instant;

    fn descriptor(format: ResponseFormat) -> RequestDescriptor {
        DescriptorBuilder::new("https://plus.dnb.com")
            .segments(["v1", "data", "duns", "123456789"])
            .format(format)
            .build()
            .unwrap()
    }

    fn executor(transport: MockTransport, rate: u32) -> Executor {
        let limiter = RateLimiter::new(LimiterConfig::new(rate)).unwrap();
        Executor::new(limiter, Arc::new(transport))
    }

    #[tokio::test(start_paused = true)]
    async fn test_json_payload() {
        let exec = executor(
            MockTransport::new(|_| Ok(RawResponse::json(200, &json!({"organization": {"duns": "123456789"}})))),
            10,
        );

        let payload = exec.execute(&descriptor(ResponseFormat::Json)).await.unwrap();
        assert_eq!(payload.status, 200);
        assert_eq!(
            payload.document().unwrap()["organization"]["duns"],
            "123456789"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_raw_payload_is_not_decoded() {
        let exec = executor(MockTransport::new(|_| Ok(RawResponse::new(200, "not json"))), 10);

        let payload = exec.execute(&descriptor(ResponseFormat::Raw)).await.unwrap();
        assert_eq!(payload.body, Body::Text("not json".into()));
        assert_eq!(payload.to_value(), json!("not json"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_taxonomy() {
        let exec = executor(
            MockTransport::new(|d| {
                let duns = d.path().last().cloned().unwrap_or_default();
                match duns.as_str() {
                    "401" => Ok(RawResponse::new(401, "expired token")),
                    "404" => Ok(RawResponse::new(404, r#"{"error": {}}"#)),
                    "bad" => Ok(RawResponse::new(200, "<html>")),
                    _ => Err(ExecError::Transport("connection reset".into())),
                }
            }),
            100,
        );

        let call = |duns: &str| {
            DescriptorBuilder::new("https://plus.dnb.com")
                .segment(duns)
                .build()
                .unwrap()
        };

        assert!(matches!(
            exec.execute(&call("401")).await,
            Err(ExecError::Auth { status: 401, .. })
        ));
        assert!(matches!(
            exec.execute(&call("404")).await,
            Err(ExecError::Status { status: 404, .. })
        ));
        assert!(matches!(
            exec.execute(&call("bad")).await,
            Err(ExecError::Decode(_))
        ));
        assert!(matches!(
            exec.execute(&call("other")).await,
            Err(ExecError::Transport(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_settles_as_timeout() {
        let exec = executor(
            MockTransport::new(|_| Ok(RawResponse::new(200, "{}")))
                .with_latency(Duration::from_secs(5)),
            10,
        );

        let result = exec
            .execute_with_deadline(&descriptor(ResponseFormat::Json), Duration::from_secs(1))
            .await;
        assert_eq!(result, Err(ExecError::Timeout(1000)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_share_the_limiter() {
        let transport = Arc::new(MockTransport::new(|_| Ok(RawResponse::new(200, "{}"))));
        let limiter = RateLimiter::new(LimiterConfig::new(2)).unwrap();
        let exec = Executor::new(limiter, transport.clone());
        let start = Instant::now();

        for _ in 0..3 {
            exec.execute(&descriptor(ResponseFormat::Json)).await.unwrap();
        }

        assert_eq!(transport.call_count(), 3);
        assert_eq!(Instant::now() - start, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_limiter_cancels_call() {
        let transport = Arc::new(MockTransport::new(|_| Ok(RawResponse::new(200, "{}"))));
        let limiter = RateLimiter::new(LimiterConfig::new(2)).unwrap();
        limiter.shutdown();
        let exec = Executor::new(limiter, transport.clone());

        let result = exec.execute(&descriptor(ResponseFormat::Json)).await;
        assert!(matches!(result, Err(ExecError::Cancelled(_))));
        assert_eq!(transport.call_count(), 0);
    }
}
