use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::types::{ChatRequest, HealthStatus};
use crate::util::is_local_endpoint_url;
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
#[cfg(test)]
use std::sync::Arc;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

const STREAM_PATH: &str = "/api/chat/stream";
const HEALTH_PATH: &str = "/api/chat/health";

#[cfg(test)]
pub trait MockStreamProducer: Send + Sync {
    fn create_mock_stream(&self, request: &ChatRequest) -> Result<ByteStream>;
}

/// HTTP client for the question-answering backend.
///
/// The only component allowed to touch the network; consumers go through the
/// dispatcher's message channel instead of calling into this directly.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    #[cfg(test)]
    mock_stream_producer: Option<Arc<dyn MockStreamProducer>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: normalize_base_url(base_url.into()),
            #[cfg(test)]
            mock_stream_producer: None,
        }
    }

    #[cfg(test)]
    pub fn new_mock(mock_producer: Arc<dyn MockStreamProducer>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "http://localhost:8000".to_string(),
            mock_stream_producer: Some(mock_producer),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_base_url(&mut self, base_url: impl Into<String>) {
        self.base_url = normalize_base_url(base_url.into());
    }

    /// Open the streaming chat connection.
    ///
    /// A non-2xx status never yields a stream: the body text is read and
    /// surfaced in the error together with the status code.
    pub async fn create_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_stream_producer {
                return producer.create_mock_stream(request);
            }
        }

        let request_url = format!("{}{STREAM_PATH}", self.base_url);

        if debug_payload_enabled() {
            if let Ok(payload) = serde_json::to_value(request) {
                emit_debug_payload(&request_url, &payload);
            }
        }

        let response = self
            .http
            .post(&request_url)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "server error: HTTP {}: {}",
                status.as_u16(),
                body.trim()
            ));
        }

        let request_url_for_stream = request_url.clone();
        let stream = response.bytes_stream().map(move |item| {
            item.map_err(|error| map_api_request_error(error, &request_url_for_stream))
        });
        Ok(Box::pin(stream))
    }

    /// Query the backend health endpoint.
    pub async fn health(&self) -> Result<HealthStatus> {
        let request_url = format!("{}{HEALTH_PATH}", self.base_url);

        let response = self
            .http
            .get(&request_url)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!(
                "health check failed: HTTP {} from '{}'",
                status.as_u16(),
                request_url
            ));
        }

        Ok(response.json::<HealthStatus>().await?)
    }
}

fn normalize_base_url(base_url: String) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

fn map_api_request_error(error: reqwest::Error, request_url: &str) -> anyhow::Error {
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return anyhow!(
            "cannot connect to '{}': {}. Is the backend running on localhost?",
            request_url,
            error
        );
    }
    if error.is_connect() {
        return anyhow!("cannot reach backend at '{}': {}", request_url, error);
    }
    if error.is_timeout() {
        return anyhow!("request to '{}' timed out: {}", request_url, error);
    }
    anyhow!("request to '{}' failed: {}", request_url, error)
}
