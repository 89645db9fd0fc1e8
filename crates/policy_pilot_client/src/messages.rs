//! Wire protocol frames matching docs/protocol.md. Client ↔ server JSON,
//! one frame per WebSocket text message.

use serde::{Deserialize, Serialize};

/// Client → server: one question.
#[derive(Debug, Clone, Serialize)]
pub struct AskMessage<'a> {
    pub message: &'a str,
}

impl<'a> AskMessage<'a> {
    pub fn new(message: &'a str) -> Self {
        Self { message }
    }
}

/// Server → client: one answer token.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenFrame {
    pub content: String,
}

/// Server → client: answer failed; `content` is user-facing.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorFrame {
    pub content: String,
}

/// One server frame; discriminator is the JSON "type" field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    Start,
    Token(String),
    End,
    Error(String),
}

/// A frame that could not be decoded. Policy is to log and discard it
/// (the transport stays up).
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame has no \"type\" field")]
    MissingType,
    #[error("unknown frame type: {0}")]
    UnknownType(String),
}

impl ServerFrame {
    /// Decode one raw text frame.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        Self::from_json(&value)
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, ProtocolError> {
        let typ = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(ProtocolError::MissingType)?;
        match typ {
            "start" => Ok(ServerFrame::Start),
            "token" => {
                let f: TokenFrame = serde_json::from_value(value.clone())?;
                Ok(ServerFrame::Token(f.content))
            }
            "end" => Ok(ServerFrame::End),
            "error" => {
                let f: ErrorFrame = serde_json::from_value(value.clone())?;
                Ok(ServerFrame::Error(f.content))
            }
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}
