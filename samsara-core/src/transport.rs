//! Outbound HTTP transport
//!
//! [`Transport`] is the seam between the publishing engine and the network.
//! [`HttpTransport`] is the production implementation; tests substitute
//! their own.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::error::{Error, Result};

/// A fully prepared POST to the ingestion API
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub url: String,
    pub headers: HeaderMap,
    /// Encoded (and possibly compressed) JSON array of events
    pub body: Vec<u8>,
    pub timeout: Duration,
}

/// Sends publish requests, reporting success or failure
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. `Ok` only for a 2xx answer.
    async fn send(&self, request: PublishRequest) -> Result<()>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        // Requests are issued from more than one runtime (the scheduler thread
        // and the caller), so connections must not outlive a single request.
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| {
                Error::InvalidConfiguration(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: PublishRequest) -> Result<()> {
        let response = self
            .http_client
            .post(&request.url)
            .headers(request.headers)
            .timeout(request.timeout)
            .body(request.body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Transport(format!("request timed out after {:?}", request.timeout))
                } else if e.is_connect() {
                    Error::Transport(format!("connection failed: {}", e))
                } else {
                    Error::Transport(format!("HTTP request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            tracing::trace!(status = status.as_u16(), url = %request.url, "Batch accepted");
            Ok(())
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}
