use super::logging::emit_frame_parse_error;
use crate::types::{WireEvent, WireFrame};

pub const DATA_PREFIX: &str = "data: ";

/// Incremental decoder for the backend's line-delimited stream format.
///
/// Raw chunks arrive with no alignment to line boundaries: a chunk may split
/// a line anywhere (including inside the `data: ` prefix) or carry several
/// lines at once. The buffer always holds exactly the bytes received but not
/// yet resolved into complete lines. One parser instance per request.
#[derive(Default)]
pub struct StreamParser {
    buffer: Vec<u8>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw chunk and return every newly completed line, in order.
    ///
    /// Chunks are buffered as raw bytes and only complete lines are decoded
    /// as text, so a multi-byte codepoint split across two reads reassembles
    /// before decoding instead of turning into replacement characters. The
    /// trailing segment after the last newline stays buffered; at
    /// end-of-stream an unterminated remainder is an incomplete frame and
    /// must be discarded, never parsed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&byte| byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let text = String::from_utf8_lossy(&line[..newline_pos]);
            lines.push(text.trim_end_matches('\r').to_string());
        }

        lines
    }

    /// Decode one complete line into a wire event.
    ///
    /// Only `data: `-prefixed lines are recognized; blank and comment lines
    /// are valid framing noise and yield `None`. A `delta` frame without
    /// content is a no-op, an `error` frame without a message falls back to
    /// a placeholder so a malformed error still reaches the user, and any
    /// unrecognized discriminator is dropped. JSON parse failures are logged
    /// and skipped; they never abort decoding.
    pub fn parse_line(line: &str) -> Option<WireEvent> {
        let payload = line.strip_prefix(DATA_PREFIX)?;

        let frame = match serde_json::from_str::<WireFrame>(payload) {
            Ok(frame) => frame,
            Err(parse_error) => {
                emit_frame_parse_error(line, &parse_error);
                return None;
            }
        };

        match frame {
            WireFrame::Delta { content } => match content {
                Some(content) if !content.is_empty() => Some(WireEvent::Delta { content }),
                _ => None,
            },
            WireFrame::Error { error } => Some(WireEvent::Error {
                message: error.unwrap_or_else(|| "Unknown error".to_string()),
            }),
            WireFrame::Stop => Some(WireEvent::Stop),
            WireFrame::Unhandled => None,
        }
    }

    /// Feed a chunk and decode every line it completes.
    pub fn process(&mut self, chunk: &[u8]) -> Vec<WireEvent> {
        self.feed(chunk)
            .iter()
            .filter_map(|line| Self::parse_line(line))
            .collect()
    }

    /// Undecoded trailing bytes, for inspection at end-of-stream.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }
}
