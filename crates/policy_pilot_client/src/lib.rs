//! PolicyPilot client library: streaming chat session over WebSocket,
//! client config, and the upload/category HTTP API.
//! Wire formats are documented in docs/protocol.md.

pub mod api;
pub mod config;
pub mod connection;
pub mod log;
pub mod messages;
pub mod session;
pub mod stream;

pub use api::{ApiClient, ApiError, UploadReceipt};
pub use config::{default_config_path, ApiSection, Config, ConfigError, ServerSection};
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState, RECONNECT_DELAY};
pub use log::{ChatTurn, LogError, MessageLog, Role};
pub use messages::{AskMessage, ProtocolError, ServerFrame};
pub use session::{Session, SessionError, SessionPhase};
pub use stream::{LogMutation, StreamAssembler, StreamState};
