//! Session controller: binds the connection manager, stream assembler, and
//! message log behind a single ordered view. Submission, inbound frames,
//! and lifecycle transitions all mutate state under one mutex covering
//! connection state, stream state, buffer, and log together, since they
//! change jointly per transition.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionState};
use crate::log::{ChatTurn, MessageLog};
use crate::messages::{AskMessage, ServerFrame};
use crate::stream::{LogMutation, StreamAssembler};

/// Externally meaningful session state, derived from connection × stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Connected and idle: `submit` is accepted.
    Ready,
    /// Connected with an answer streaming: `submit` is rejected.
    Busy,
    /// Not connected (reconnecting in the background).
    Offline,
}

/// Session-level failure. Never fatal to the session object; the only way
/// to end a session is `stop()`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// `submit` outside `Ready`. The request is rejected, not queued; the
    /// caller must not blindly retry.
    #[error("cannot submit while session is {0:?}")]
    InvalidState(SessionPhase),
    #[error("failed to encode request: {0}")]
    Encode(String),
}

struct SessionState {
    connection: ConnectionState,
    assembler: StreamAssembler,
    log: MessageLog,
    /// Set by `stop()`. Checked under the same lock by the event loop, so
    /// no event observed after stop can mutate session state.
    stopped: bool,
}

impl SessionState {
    fn phase(&self) -> SessionPhase {
        if self.connection != ConnectionState::Connected {
            // A disconnect forces the stream idle, so Offline never hides
            // an open stream.
            SessionPhase::Offline
        } else if self.assembler.is_streaming() {
            SessionPhase::Busy
        } else {
            SessionPhase::Ready
        }
    }
}

/// One chat session: a message log spanning possibly many underlying
/// connections. Cheap to share behind an `Arc`.
pub struct Session {
    state: Arc<Mutex<SessionState>>,
    conn: ConnectionManager,
    updates: watch::Sender<u64>,
    events_task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Start a session against `url`. Spawns the connection manager's
    /// retry loop and the session event loop; must be called inside a
    /// tokio runtime.
    pub fn start(url: &str) -> Self {
        let (conn, events_rx) = ConnectionManager::new(url);
        conn.start();
        let state = Arc::new(Mutex::new(SessionState {
            connection: ConnectionState::Disconnected,
            assembler: StreamAssembler::new(),
            log: MessageLog::new(),
            stopped: false,
        }));
        let (updates, _) = watch::channel(0);
        let task = tokio::spawn(event_loop(events_rx, state.clone(), updates.clone()));
        Self {
            state,
            conn,
            updates,
            events_task: Mutex::new(Some(task)),
        }
    }

    /// Submit one question. Valid only in `Ready`: appends a user turn and
    /// forwards the encoded request; the assistant turn is created only
    /// when the server's `start` frame arrives. Outside `Ready` this fails
    /// without mutating anything.
    pub fn submit(&self, text: &str) -> Result<(), SessionError> {
        let payload = serde_json::to_string(&AskMessage::new(text))
            .map_err(|e| SessionError::Encode(e.to_string()))?;
        let mut state = self.state.lock().unwrap();
        match state.phase() {
            SessionPhase::Ready => {}
            other => return Err(SessionError::InvalidState(other)),
        }
        state.log.append(ChatTurn::user(text));
        self.conn.send(payload);
        drop(state);
        self.notify();
        Ok(())
    }

    /// Current externally visible phase.
    pub fn phase(&self) -> SessionPhase {
        self.state.lock().unwrap().phase()
    }

    /// Immutable ordered copy of the chat history.
    pub fn snapshot(&self) -> Vec<ChatTurn> {
        self.state.lock().unwrap().log.snapshot()
    }

    /// Revision counter bumped on every state transition. Await changes on
    /// the receiver instead of polling `snapshot`/`phase`.
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.updates.subscribe()
    }

    /// End the session: stop the connection manager and the event loop. No
    /// event dispatched after this returns touches session state.
    pub fn stop(&self) {
        self.conn.stop();
        // The manager emits no Disconnected after stop, so force the
        // transition here: a stopped session is Offline and rejects submit.
        // The flag also fences out any event-loop iteration already past
        // its recv when the abort lands.
        {
            let mut state = self.state.lock().unwrap();
            state.stopped = true;
            state.connection = ConnectionState::Disconnected;
            state.assembler.abandon();
        }
        if let Some(task) = self.events_task.lock().unwrap().take() {
            task.abort();
        }
        self.notify();
    }

    fn notify(&self) {
        self.updates.send_modify(|rev| *rev += 1);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The session's single ordering queue: connection events are applied here
/// in delivery order, interleaved correctly with frames; `submit` serializes
/// against it through the shared mutex.
async fn event_loop(
    mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
    state: Arc<Mutex<SessionState>>,
    updates: watch::Sender<u64>,
) {
    while let Some(event) = events.recv().await {
        {
            let mut state = state.lock().unwrap();
            if state.stopped {
                return;
            }
            match event {
                ConnectionEvent::Connected => {
                    state.connection = ConnectionState::Connected;
                }
                ConnectionEvent::Disconnected => {
                    state.connection = ConnectionState::Disconnected;
                    // Abandon any open stream in place: the partial
                    // assistant turn stays, no error turn is synthesized.
                    state.assembler.abandon();
                }
                ConnectionEvent::Frame(raw) => match ServerFrame::decode(&raw) {
                    Ok(frame) => {
                        debug!(?frame, "inbound frame");
                        if let Some(mutation) = state.assembler.handle(frame) {
                            apply(&mut state.log, mutation);
                        }
                    }
                    Err(e) => warn!(error = %e, "discarding malformed frame"),
                },
            }
        }
        updates.send_modify(|rev| *rev += 1);
    }
}

fn apply(log: &mut MessageLog, mutation: LogMutation) {
    match mutation {
        LogMutation::OpenAssistantTurn => log.append(ChatTurn::assistant("")),
        LogMutation::ReplaceLast(content) => {
            // Only reachable while a stream is open, in which case the
            // last turn is the assistant turn the `start` frame appended.
            if let Err(e) = log.replace_last(content) {
                warn!(error = %e, "dropped token replacement");
            }
        }
        LogMutation::AppendErrorTurn(content) => log.append(ChatTurn::error(content)),
    }
}
