//! Stream assembler: folds a `start … token* … (end|error)` frame sequence
//! into one growing answer buffer. At most one stream is open at a time.

use tracing::warn;

use crate::messages::ServerFrame;

/// Whether an answer is currently being produced. Global to the session,
/// not per-message: while `Streaming`, no new request may be submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
}

/// Instruction for the session controller to apply to the message log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogMutation {
    /// Append a new, empty assistant turn; it becomes the open turn.
    OpenAssistantTurn,
    /// Replace the open turn's content with the full accumulated buffer.
    ReplaceLast(String),
    /// Append an error turn. Additive: partial assistant output stays.
    AppendErrorTurn(String),
}

/// Owns the stream state and the single answer buffer.
#[derive(Debug)]
pub struct StreamAssembler {
    state: StreamState,
    buffer: String,
}

impl Default for StreamAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self { state: StreamState::Idle, buffer: String::new() }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state == StreamState::Streaming
    }

    /// Consume one decoded frame; returns at most one log mutation.
    ///
    /// Frames inconsistent with the current state (a second `start`, a
    /// `token` or `end` with no open stream) are protocol violations:
    /// logged and ignored, never applied. Tokens only ever append, so the
    /// open turn's content grows monotonically.
    pub fn handle(&mut self, frame: ServerFrame) -> Option<LogMutation> {
        match frame {
            ServerFrame::Start => {
                if self.is_streaming() {
                    warn!("protocol violation: start frame while a stream is open; ignored");
                    return None;
                }
                self.buffer.clear();
                self.state = StreamState::Streaming;
                Some(LogMutation::OpenAssistantTurn)
            }
            ServerFrame::Token(content) => {
                if !self.is_streaming() {
                    warn!("protocol violation: token frame with no open stream; ignored");
                    return None;
                }
                self.buffer.push_str(&content);
                Some(LogMutation::ReplaceLast(self.buffer.clone()))
            }
            ServerFrame::End => {
                if !self.is_streaming() {
                    warn!("protocol violation: end frame with no open stream; ignored");
                    return None;
                }
                // The buffer's final value is already reflected in the log.
                self.state = StreamState::Idle;
                None
            }
            ServerFrame::Error(content) => {
                // Unconditional: recovers even from an error with no open
                // stream. The error turn is appended, not substituted for
                // the in-progress assistant turn.
                self.state = StreamState::Idle;
                Some(LogMutation::AppendErrorTurn(content))
            }
        }
    }

    /// Abandon an open stream in place (mid-stream disconnect). The
    /// partially built assistant turn stays in the log as-is; no error
    /// turn is synthesized.
    pub fn abandon(&mut self) {
        self.state = StreamState::Idle;
    }
}
