use crate::api::stream::StreamParser;
use crate::api::ApiClient;
use crate::config::{validate_api_url, Config};
use crate::types::{ChatRequest, LifecycleEvent, WireEvent};
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};

/// Inbound message to the dispatcher task.
///
/// Results are never returned on this channel: stream events are pushed
/// through the request's `EventSink`, config reads reply on a oneshot.
pub enum DispatcherRequest {
    StreamChat {
        request: ChatRequest,
        events: EventSink,
    },
    GetConfig {
        reply_tx: oneshot::Sender<String>,
    },
    SetConfig {
        api_url: String,
        reply_tx: oneshot::Sender<bool>,
    },
}

/// Order-preserving lifecycle event channel back to one consumer.
///
/// Delivery failure means the consumer side was torn down; that is not an
/// error for the dispatcher, whose decode loop runs to natural completion.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<LifecycleEvent>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, event: LifecycleEvent) {
        let _ = self.tx.send(event);
    }
}

/// Terminal phases of one streamed request.
///
/// A request moves `Requesting` → `Streaming` once the transport confirms a
/// success status (that transition emits the single `Start` event), then ends
/// in exactly one of the two terminal phases below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Completed,
    Failed,
}

/// The privileged side of the pipeline: owns the network capability and the
/// authoritative base-URL config, and decodes the wire stream into lifecycle
/// events. Requests are served strictly one at a time.
pub struct Dispatcher {
    config: Config,
    client: ApiClient,
}

impl Dispatcher {
    pub fn new(config: Config) -> Self {
        let client = ApiClient::new(config.api_url.clone());
        Self { config, client }
    }

    #[cfg(test)]
    pub fn with_client(config: Config, client: ApiClient) -> Self {
        Self { config, client }
    }

    pub async fn run(mut self, mut requests: mpsc::UnboundedReceiver<DispatcherRequest>) {
        while let Some(request) = requests.recv().await {
            match request {
                DispatcherRequest::StreamChat { request, events } => {
                    self.stream_chat(&request, &events).await;
                }
                DispatcherRequest::GetConfig { reply_tx } => {
                    let _ = reply_tx.send(self.config.api_url.clone());
                }
                DispatcherRequest::SetConfig { api_url, reply_tx } => {
                    let accepted = validate_api_url(&api_url).is_ok();
                    if accepted {
                        self.config.api_url = api_url.clone();
                        self.client.set_base_url(api_url);
                    }
                    let _ = reply_tx.send(accepted);
                }
            }
        }
    }

    /// Stream one request, emitting `Start`, then one `Chunk` per decoded
    /// delta, then exactly one terminal event. Nothing is emitted after the
    /// terminal event and the transport is not read again once a `stop` or
    /// `error` frame has been decoded.
    pub async fn stream_chat(&self, request: &ChatRequest, events: &EventSink) -> StreamPhase {
        let mut stream = match self.client.create_stream(request).await {
            Ok(stream) => stream,
            Err(error) => {
                // Covers both unreachable transport and non-2xx status; the
                // message already distinguishes them.
                events.emit(LifecycleEvent::Error {
                    message: error.to_string(),
                });
                return StreamPhase::Failed;
            }
        };

        events.emit(LifecycleEvent::Start);

        let mut parser = StreamParser::new();
        while let Some(chunk_result) = stream.next().await {
            let chunk = match chunk_result {
                Ok(chunk) => chunk,
                Err(error) => {
                    events.emit(LifecycleEvent::Error {
                        message: error.to_string(),
                    });
                    return StreamPhase::Failed;
                }
            };

            for event in parser.process(&chunk) {
                match event {
                    WireEvent::Delta { content } => {
                        events.emit(LifecycleEvent::Chunk { content });
                    }
                    WireEvent::Error { message } => {
                        events.emit(LifecycleEvent::Error { message });
                        return StreamPhase::Failed;
                    }
                    WireEvent::Stop => {
                        events.emit(LifecycleEvent::Complete);
                        return StreamPhase::Completed;
                    }
                }
            }
        }

        // End-of-stream without an explicit stop frame still completes; any
        // newline-unterminated remainder in the parser is an incomplete frame
        // and is discarded with it.
        events.emit(LifecycleEvent::Complete);
        StreamPhase::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::{ByteStream, MockStreamProducer};
    use crate::api::mock_client::MockApiClient;
    use anyhow::{anyhow, Result};
    use bytes::Bytes;
    use futures::stream;
    use std::sync::Arc;

    fn mock_dispatcher(responses: Vec<Vec<String>>) -> Dispatcher {
        let client = ApiClient::new_mock(Arc::new(MockApiClient::new(responses)));
        Dispatcher::with_client(
            Config {
                api_url: "http://localhost:8000".to_string(),
            },
            client,
        )
    }

    fn request() -> ChatRequest {
        ChatRequest::new("selected", "why?", "https://example.com").unwrap()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<LifecycleEvent>) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_stream_chat_emits_start_chunks_complete_in_order() {
        let dispatcher = mock_dispatcher(vec![vec![
            "data: {\"event_type\":\"delta\",\"content\":\"Hel\"}\n".to_string(),
            "data: {\"event_type\":\"delta\",\"content\":\"lo\"}\ndata: {\"event_type\":\"stop\"}\n"
                .to_string(),
        ]]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let phase = dispatcher.stream_chat(&request(), &EventSink::new(tx)).await;

        assert_eq!(phase, StreamPhase::Completed);
        assert_eq!(
            drain(&mut rx),
            vec![
                LifecycleEvent::Start,
                LifecycleEvent::Chunk {
                    content: "Hel".to_string()
                },
                LifecycleEvent::Chunk {
                    content: "lo".to_string()
                },
                LifecycleEvent::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn test_end_of_stream_without_stop_frame_completes() {
        let dispatcher = mock_dispatcher(vec![vec![
            "data: {\"event_type\":\"delta\",\"content\":\"Hi\"}\n".to_string(),
        ]]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let phase = dispatcher.stream_chat(&request(), &EventSink::new(tx)).await;

        assert_eq!(phase, StreamPhase::Completed);
        assert_eq!(
            drain(&mut rx),
            vec![
                LifecycleEvent::Start,
                LifecycleEvent::Chunk {
                    content: "Hi".to_string()
                },
                LifecycleEvent::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn test_trailing_unterminated_line_is_discarded_at_end_of_stream() {
        let dispatcher = mock_dispatcher(vec![vec![
            "data: {\"event_type\":\"delta\",\"content\":\"done\"}\ndata: {\"event_type\":\"delta\","
                .to_string(),
        ]]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        dispatcher.stream_chat(&request(), &EventSink::new(tx)).await;

        assert_eq!(
            drain(&mut rx),
            vec![
                LifecycleEvent::Start,
                LifecycleEvent::Chunk {
                    content: "done".to_string()
                },
                LifecycleEvent::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn test_error_frame_emits_single_error_and_stops_decoding() {
        // The delta after the error frame sits in the same chunk and must
        // never be delivered.
        let dispatcher = mock_dispatcher(vec![vec![
            "data: {\"event_type\":\"error\",\"error\":\"rate limited\"}\ndata: {\"event_type\":\"delta\",\"content\":\"late\"}\n"
                .to_string(),
        ]]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let phase = dispatcher.stream_chat(&request(), &EventSink::new(tx)).await;

        assert_eq!(phase, StreamPhase::Failed);
        assert_eq!(
            drain(&mut rx),
            vec![
                LifecycleEvent::Start,
                LifecycleEvent::Error {
                    message: "rate limited".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_frame_stops_reading_further_chunks() {
        let dispatcher = mock_dispatcher(vec![vec![
            "data: {\"event_type\":\"stop\"}\n".to_string(),
            "data: {\"event_type\":\"delta\",\"content\":\"never\"}\n".to_string(),
        ]]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let phase = dispatcher.stream_chat(&request(), &EventSink::new(tx)).await;

        assert_eq!(phase, StreamPhase::Completed);
        assert_eq!(
            drain(&mut rx),
            vec![LifecycleEvent::Start, LifecycleEvent::Complete]
        );
    }

    #[tokio::test]
    async fn test_connect_failure_emits_error_without_start() {
        // An empty mock script makes create_stream fail before any response.
        let dispatcher = mock_dispatcher(vec![]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let phase = dispatcher.stream_chat(&request(), &EventSink::new(tx)).await;

        assert_eq!(phase, StreamPhase::Failed);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], LifecycleEvent::Error { .. }));
    }

    struct FailingAfterFirstChunk;

    impl MockStreamProducer for FailingAfterFirstChunk {
        fn create_mock_stream(&self, _request: &ChatRequest) -> Result<ByteStream> {
            let items: Vec<Result<Bytes>> = vec![
                Ok(Bytes::from(
                    "data: {\"event_type\":\"delta\",\"content\":\"part\"}\n",
                )),
                Err(anyhow!("connection reset by peer")),
            ];
            Ok(Box::pin(stream::iter(items)))
        }
    }

    #[tokio::test]
    async fn test_transport_failure_mid_stream_emits_single_error() {
        let client = ApiClient::new_mock(Arc::new(FailingAfterFirstChunk));
        let dispatcher = Dispatcher::with_client(
            Config {
                api_url: "http://localhost:8000".to_string(),
            },
            client,
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        let phase = dispatcher.stream_chat(&request(), &EventSink::new(tx)).await;

        assert_eq!(phase, StreamPhase::Failed);
        assert_eq!(
            drain(&mut rx),
            vec![
                LifecycleEvent::Start,
                LifecycleEvent::Chunk {
                    content: "part".to_string()
                },
                LifecycleEvent::Error {
                    message: "connection reset by peer".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_torn_down_consumer_does_not_fail_the_decode_loop() {
        let dispatcher = mock_dispatcher(vec![vec![
            "data: {\"event_type\":\"delta\",\"content\":\"Hi\"}\ndata: {\"event_type\":\"stop\"}\n"
                .to_string(),
        ]]);
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let phase = dispatcher.stream_chat(&request(), &EventSink::new(tx)).await;
        assert_eq!(phase, StreamPhase::Completed);
    }

    #[tokio::test]
    async fn test_run_services_config_get_and_set() {
        let dispatcher = Dispatcher::new(Config {
            api_url: "http://localhost:8000".to_string(),
        });
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(dispatcher.run(request_rx));

        let (reply_tx, reply_rx) = oneshot::channel();
        request_tx
            .send(DispatcherRequest::GetConfig { reply_tx })
            .unwrap();
        assert_eq!(reply_rx.await.unwrap(), "http://localhost:8000");

        let (reply_tx, reply_rx) = oneshot::channel();
        request_tx
            .send(DispatcherRequest::SetConfig {
                api_url: "http://10.0.0.5:9000".to_string(),
                reply_tx,
            })
            .unwrap();
        assert!(reply_rx.await.unwrap());

        let (reply_tx, reply_rx) = oneshot::channel();
        request_tx
            .send(DispatcherRequest::GetConfig { reply_tx })
            .unwrap();
        assert_eq!(reply_rx.await.unwrap(), "http://10.0.0.5:9000");

        let (reply_tx, reply_rx) = oneshot::channel();
        request_tx
            .send(DispatcherRequest::SetConfig {
                api_url: "not a url".to_string(),
                reply_tx,
            })
            .unwrap();
        assert!(!reply_rx.await.unwrap());

        drop(request_tx);
        handle.await.unwrap();
    }
}
