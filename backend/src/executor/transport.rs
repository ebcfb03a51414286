//! HTTP transport
//!
//! The transport sends exactly what a descriptor says and returns the status
//! and the complete body. Status classification, decoding, deadlines and rate
//! limiting are the executor's job.

use crate::error::AppError;
use crate::executor::error::ExecError;
use crate::request::RequestDescriptor;
use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;

/// Status and complete body of one response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Complete response body
    pub body: String,
}

impl RawResponse {
    /// Response with a text body
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Response with a JSON body
    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }
}

/// Sends one request
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transmit the request and collect the full response
    async fn send(&self, descriptor: &RequestDescriptor) -> Result<RawResponse, ExecError>;
}

/// `reqwest`-backed transport sharing one pooled client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a fresh client
    pub fn new() -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("dpl-batch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal(anyhow!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Create a transport on top of an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, descriptor: &RequestDescriptor) -> Result<RawResponse, ExecError> {
        let url = descriptor.url();

        tracing::debug!(
            method = %descriptor.method(),
            host = url.host_str().unwrap_or_default(),
            path = %url.path(),
            "Sending request"
        );

        let mut request = self.client.request(descriptor.method().clone(), url);
        for (name, value) in descriptor.headers() {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExecError::Transport(format!("Failed to send HTTP request: {}", e)))?;

        let status = response.status().as_u16();

        // the whole body is collected before anything is handed upward
        let body = response
            .text()
            .await
            .map_err(|e| ExecError::Transport(format!("Failed to read response body: {}", e)))?;

        Ok(RawResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::DescriptorBuilder;
    use mockito::{Matcher, Server};
    use serial_test::serial;

    #[tokio::test]
    #[serial]
    async fn test_send_passes_path_query_and_headers() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/data/duns/804735132")
            .match_query(Matcher::UrlEncoded(
                "blockIDs".into(),
                "companyinfo_L2_v1".into(),
            ))
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_body(r#"{"organization": {"duns": "804735132"}}"#)
            .create_async()
            .await;

        let descriptor = DescriptorBuilder::new(server.url())
            .segments(["v1", "data", "duns", "804735132"])
            .query("blockIDs", "companyinfo_L2_v1")
            .header("Authorization", "Bearer test-token")
            .build()
            .unwrap();

        let transport = HttpTransport::new().unwrap();
        let response = transport.send(&descriptor).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 200);
        assert!(response.body.contains("804735132"));
    }

    #[tokio::test]
    #[serial]
    async fn test_error_status_is_not_a_transport_error() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/search/typeahead")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"error": {"errorMessage": "No Match found"}}"#)
            .create_async()
            .await;

        let descriptor = DescriptorBuilder::new(server.url())
            .segments(["v1", "search", "typeahead"])
            .query("searchTerm", "zzzz")
            .build()
            .unwrap();

        let response = HttpTransport::new().unwrap().send(&descriptor).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 404);
        assert!(response.body.contains("No Match found"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let descriptor = DescriptorBuilder::new("http://127.0.0.1:1")
            .segment("nothing")
            .build()
            .unwrap();

        let result = HttpTransport::new().unwrap().send(&descriptor).await;
        assert!(matches!(result, Err(ExecError::Transport(_))));
    }
}
