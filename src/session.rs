use crate::types::LifecycleEvent;

/// Per-request consumer state: the growing answer buffer plus the
/// single-flight flag. At most one session is active per panel.
#[derive(Debug, Default)]
pub struct StreamSession {
    accumulated_text: String,
    is_active: bool,
}

/// What the panel currently shows.
///
/// `Answer.markdown` is always the complete accumulated text, never a delta:
/// intermediate delta content is not valid standalone markdown, so every
/// re-render is the same transform of the full buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelView {
    Idle,
    Thinking,
    Answer { markdown: String, live: bool },
    Failure { message: String },
}

/// The receiving side of the pipeline, standing in for the extension's
/// floating answer panel. Folds ordered lifecycle events into the session
/// and its view state; once dismissed, every further event is a no-op.
#[derive(Debug)]
pub struct ResponsePanel {
    session: StreamSession,
    view: PanelView,
    open: bool,
}

impl Default for ResponsePanel {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponsePanel {
    pub fn new() -> Self {
        Self {
            session: StreamSession::default(),
            view: PanelView::Idle,
            open: true,
        }
    }

    /// Single-flight guard: claims the session for a new submission.
    ///
    /// Returns false, leaving all state untouched, while a stream is already
    /// active or after the panel was dismissed.
    pub fn begin_submission(&mut self) -> bool {
        if !self.open || self.session.is_active {
            return false;
        }
        self.session.is_active = true;
        self.session.accumulated_text.clear();
        self.view = PanelView::Thinking;
        true
    }

    /// Rolls back a claimed submission that never reached the dispatcher,
    /// so the single-flight guard does not stay held forever.
    pub fn abort_submission(&mut self) {
        self.session.is_active = false;
        self.view = PanelView::Idle;
    }

    pub fn on_event(&mut self, event: LifecycleEvent) {
        if !self.open {
            return;
        }

        match event {
            LifecycleEvent::Start => {
                self.session.accumulated_text.clear();
            }
            LifecycleEvent::Chunk { content } => {
                self.session.accumulated_text.push_str(&content);
                self.view = PanelView::Answer {
                    markdown: self.session.accumulated_text.clone(),
                    live: true,
                };
            }
            LifecycleEvent::Complete => {
                self.view = PanelView::Answer {
                    markdown: self.session.accumulated_text.clone(),
                    live: false,
                };
                self.session.is_active = false;
            }
            LifecycleEvent::Error { message } => {
                // The error message takes display priority over any partial
                // answer already accumulated.
                self.view = PanelView::Failure { message };
                self.session.is_active = false;
            }
        }
    }

    /// Tear down the presentation surface. The dispatcher's stream is left
    /// to run to natural completion; its remaining events become no-ops.
    pub fn dismiss(&mut self) {
        self.open = false;
        self.session.is_active = false;
        self.view = PanelView::Idle;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_streaming(&self) -> bool {
        self.session.is_active
    }

    pub fn accumulated_text(&self) -> &str {
        &self.session.accumulated_text
    }

    pub fn view(&self) -> &PanelView {
        &self.view
    }
}
