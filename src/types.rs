use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// One user question about a text selection, as posted to the backend.
///
/// Immutable once built; the dispatcher owns it for the duration of one
/// stream. Field names match the backend's JSON body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub selected_text: String,
    pub question: String,
    pub context_url: String,
}

impl ChatRequest {
    pub fn new(
        selected_text: impl Into<String>,
        question: impl Into<String>,
        context_url: impl Into<String>,
    ) -> Result<Self> {
        let selected_text = selected_text.into().trim().to_string();
        let question = question.into().trim().to_string();

        if selected_text.is_empty() {
            bail!("selected text must not be empty");
        }
        if question.is_empty() {
            bail!("question must not be empty");
        }

        Ok(Self {
            selected_text,
            question,
            context_url: context_url.into(),
        })
    }
}

/// One frame of the wire format, as it appears after the `data: ` prefix.
///
/// Discriminators the backend does not document yet fall into `Unhandled`
/// instead of failing deserialization.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum WireFrame {
    Delta { content: Option<String> },
    Error { error: Option<String> },
    Stop,
    #[serde(other)]
    Unhandled,
}

/// A decoded wire frame that carries meaning for the stream: text to
/// append, a server-side error, or end of the answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    Delta { content: String },
    Error { message: String },
    Stop,
}

/// Dispatcher-to-consumer message, the only contract the consumer depends
/// on. For one request the order is always `Start`, zero or more `Chunk`,
/// then exactly one of `Complete` or `Error`; nothing follows a terminal
/// event. Serializes with the extension's message-channel tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LifecycleEvent {
    #[serde(rename = "STREAM_START")]
    Start,
    #[serde(rename = "STREAM_CHUNK")]
    Chunk { content: String },
    #[serde(rename = "STREAM_COMPLETE")]
    Complete,
    #[serde(rename = "STREAM_ERROR")]
    Error {
        #[serde(rename = "error")]
        message: String,
    },
}

/// Response body of the backend health endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: String,
    pub service: String,
}
