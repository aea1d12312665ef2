use crate::api::client::{ByteStream, MockStreamProducer};
use crate::types::ChatRequest;
use anyhow::Result;
use bytes::Bytes;
use futures::stream;
use std::sync::{Arc, Mutex};

/// Scripted stream source for dispatcher tests.
///
/// Each configured response is a list of raw chunks delivered verbatim, so
/// tests control exactly where the byte stream splits relative to line
/// boundaries.
#[derive(Clone)]
pub struct MockApiClient {
    responses: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockApiClient {
    pub fn new(responses: Vec<Vec<String>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
        }
    }
}

#[cfg(test)]
impl MockStreamProducer for MockApiClient {
    fn create_mock_stream(&self, _request: &ChatRequest) -> Result<ByteStream> {
        let mut responses_guard = self.responses.lock().unwrap();
        if responses_guard.is_empty() {
            return Err(anyhow::anyhow!(
                "MockApiClient: No more responses configured"
            ));
        }
        let chunks = responses_guard.remove(0);

        let byte_chunks: Vec<Result<Bytes>> =
            chunks.into_iter().map(|s| Ok(Bytes::from(s))).collect();

        Ok(Box::pin(stream::iter(byte_chunks)))
    }
}
