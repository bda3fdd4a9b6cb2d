//! Publisher for encoding and sending event batches to the ingestion API
//!
//! One call to [`Publisher::post`] is one HTTP request: the batch is
//! serialized as a JSON array, compressed with the configured codec and
//! handed to the transport with the ingestion headers.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_ENCODING, CONTENT_TYPE};

use crate::compression::Compressor;
use crate::error::{Error, Result};
use crate::event::{now_millis, Event};
use crate::transport::{PublishRequest, Transport};

/// Samsara specific HTTP header, stamped with the send time in epoch millis
pub const PUBLISHED_TIMESTAMP_HEADER: &str = "X-Samsara-publishedTimestamp";

/// Binds endpoint, codec and transport for outbound batches
#[derive(Clone)]
pub struct Publisher {
    endpoint: String,
    compressor: Arc<dyn Compressor>,
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl Publisher {
    pub fn new(
        endpoint: String,
        compressor: Arc<dyn Compressor>,
        transport: Arc<dyn Transport>,
        timeout: Duration,
    ) -> Self {
        Self {
            endpoint,
            compressor,
            transport,
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Serialize and compress a batch
    pub fn encode<E: serde::Serialize>(&self, events: &[E]) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(events)?;
        self.compressor.compress(&json)
    }

    /// Ingestion headers for a request sent now
    pub fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            CONTENT_ENCODING,
            HeaderValue::from_str(self.compressor.content_encoding()).map_err(|e| {
                Error::InvalidArgument(format!("invalid content encoding: {}", e))
            })?,
        );
        headers.insert(
            PUBLISHED_TIMESTAMP_HEADER,
            HeaderValue::from(now_millis()),
        );
        Ok(headers)
    }

    /// Send one batch. Returns `Ok` only when the API accepted it.
    pub async fn post(&self, events: &[&Event]) -> Result<()> {
        let body = self.encode(events)?;
        let request = PublishRequest {
            url: self.endpoint.clone(),
            headers: self.headers()?,
            body,
            timeout: self.timeout,
        };

        tracing::trace!(
            events = events.len(),
            bytes = request.body.len(),
            url = %self.endpoint,
            "Posting batch"
        );
        self.transport.send(request).await
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("endpoint", &self.endpoint)
            .field("content_encoding", &self.compressor.content_encoding())
            .field("timeout", &self.timeout)
            .finish()
    }
}
