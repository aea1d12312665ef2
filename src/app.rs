use crate::config::Config;
use crate::dispatch::{Dispatcher, DispatcherRequest, EventSink};
use crate::session::ResponsePanel;
use crate::types::{ChatRequest, LifecycleEvent};
use anyhow::{anyhow, bail, Result};
use tokio::sync::{mpsc, oneshot};

/// Wires the consumer side to a spawned dispatcher task.
///
/// The dispatcher runs as its own task holding the only network capability;
/// this side submits request descriptors fire-and-forget and receives
/// lifecycle events on its own ordered channel, mirroring the extension's
/// content-script / background-worker split.
pub struct App {
    panel: ResponsePanel,
    request_tx: mpsc::UnboundedSender<DispatcherRequest>,
    event_tx: mpsc::UnboundedSender<LifecycleEvent>,
    event_rx: mpsc::UnboundedReceiver<LifecycleEvent>,
}

impl App {
    pub fn new(config: Config) -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        tokio::spawn(Dispatcher::new(config).run(request_rx));
        Self::with_request_channel(request_tx)
    }

    #[cfg(test)]
    pub fn with_dispatcher(dispatcher: Dispatcher) -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatcher.run(request_rx));
        Self::with_request_channel(request_tx)
    }

    fn with_request_channel(request_tx: mpsc::UnboundedSender<DispatcherRequest>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            panel: ResponsePanel::new(),
            request_tx,
            event_tx,
            event_rx,
        }
    }

    pub fn panel(&self) -> &ResponsePanel {
        &self.panel
    }

    pub fn dismiss_panel(&mut self) {
        self.panel.dismiss();
    }

    /// Read the dispatcher's configured base URL (the popup's `GET_CONFIG`).
    pub async fn api_url(&self) -> Result<String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send(DispatcherRequest::GetConfig { reply_tx })
            .map_err(|_| anyhow!("dispatcher is gone"))?;
        reply_rx.await.map_err(|_| anyhow!("dispatcher is gone"))
    }

    /// Replace the dispatcher's base URL (the popup's `SET_CONFIG`).
    pub async fn set_api_url(&self, api_url: impl Into<String>) -> Result<()> {
        let api_url = api_url.into();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send(DispatcherRequest::SetConfig {
                api_url: api_url.clone(),
                reply_tx,
            })
            .map_err(|_| anyhow!("dispatcher is gone"))?;
        if !reply_rx.await.map_err(|_| anyhow!("dispatcher is gone"))? {
            bail!("dispatcher rejected API URL '{}'", api_url);
        }
        Ok(())
    }

    /// Submit one question. Fire-and-forget: nothing is returned on this
    /// path, the answer arrives through `next_event`. Rejected while a
    /// previous submission is still streaming.
    pub fn submit(&mut self, request: ChatRequest) -> Result<()> {
        if !self.panel.begin_submission() {
            bail!("a question is already streaming");
        }
        let sent = self.request_tx.send(DispatcherRequest::StreamChat {
            request,
            events: EventSink::new(self.event_tx.clone()),
        });
        if sent.is_err() {
            // The request never reached the dispatcher, so no terminal
            // event will ever release the session.
            self.panel.abort_submission();
            bail!("dispatcher is gone");
        }
        Ok(())
    }

    /// Receive the next lifecycle event, after folding it into the panel.
    pub async fn next_event(&mut self) -> Option<LifecycleEvent> {
        let event = self.event_rx.recv().await?;
        self.panel.on_event(event.clone());
        Some(event)
    }

    /// Submit and drain events until the terminal one, returning the full
    /// answer text or the stream's error message.
    pub async fn ask(&mut self, request: ChatRequest) -> Result<String> {
        self.submit(request)?;

        while let Some(event) = self.next_event().await {
            match event {
                LifecycleEvent::Complete => {
                    return Ok(self.panel.accumulated_text().to_string());
                }
                LifecycleEvent::Error { message } => bail!(message),
                LifecycleEvent::Start | LifecycleEvent::Chunk { .. } => {}
            }
        }

        bail!("event channel closed before a terminal event")
    }
}
