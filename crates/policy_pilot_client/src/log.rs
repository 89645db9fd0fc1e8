//! Append-only chat history. Turns are immutable once appended, with one
//! exception: the content of a trailing assistant turn may be replaced
//! wholesale while its answer is still streaming.

use serde::Serialize;

/// Who a chat turn is attributable to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Error,
}

/// One entry in the chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self { role: Role::Error, content: content.into() }
    }
}

/// Rejected log mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogError {
    #[error("cannot replace last turn of an empty log")]
    Empty,
    #[error("last turn is not an assistant turn")]
    LastNotAssistant,
}

/// Insertion-ordered sequence of chat turns. No deletion; history only
/// grows for the lifetime of the session.
#[derive(Debug, Default)]
pub struct MessageLog {
    turns: Vec<ChatTurn>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    /// Replace the content of the last turn. Only valid while the last turn
    /// is an assistant turn; the value is the full accumulated answer, not
    /// a delta, so the log always holds a complete renderable string.
    pub fn replace_last(&mut self, content: String) -> Result<(), LogError> {
        let last = self.turns.last_mut().ok_or(LogError::Empty)?;
        if last.role != Role::Assistant {
            return Err(LogError::LastNotAssistant);
        }
        last.content = content;
        Ok(())
    }

    pub fn last(&self) -> Option<&ChatTurn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// An owned, ordered copy for observation.
    pub fn snapshot(&self) -> Vec<ChatTurn> {
        self.turns.clone()
    }
}
