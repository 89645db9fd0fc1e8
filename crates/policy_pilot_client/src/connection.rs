//! Connection manager: owns the single WebSocket to the server, detects
//! loss, and retries on a fixed delay. Inbound frames and lifecycle
//! transitions are delivered, in order, to one listener channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Delay between reconnect attempts. Fixed, no backoff: the server is a
/// local, always-available peer and reconnection is a liveness mechanism.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// State of the underlying channel. Exactly one channel is current at a
/// time; the manager owns it exclusively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events delivered to the registered listener. Lifecycle events interleave
/// with frames in occurrence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    /// One raw text frame, undecoded. Malformed frames are the stream
    /// assembler's concern, not the transport's.
    Frame(String),
}

struct Shared {
    url: String,
    state: Mutex<ConnectionState>,
    /// Sender into the currently open channel, if any. Replaced wholesale
    /// on every new connection; a previous channel is never reused.
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    stopped: AtomicBool,
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        *self.state.lock().unwrap() = next;
    }

    /// Emit an event unless `stop()` has been called.
    fn emit(&self, event: ConnectionEvent) {
        if !self.stopped.load(Ordering::SeqCst) {
            let _ = self.events.send(event);
        }
    }
}

/// Owns the connect/retry loop for one server URL.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a manager for `url` (e.g. `ws://127.0.0.1:8000/ws/chat`).
    /// The returned receiver is the single listener for all events.
    pub fn new(url: &str) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let manager = Self {
            shared: Arc::new(Shared {
                url: url.to_string(),
                state: Mutex::new(ConnectionState::Disconnected),
                outbound: Mutex::new(None),
                events: events_tx,
                stopped: AtomicBool::new(false),
            }),
            task: Mutex::new(None),
        };
        (manager, events_rx)
    }

    /// Begin the connect/retry loop. Idempotent: a no-op if already started.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap();
        if task.is_some() {
            return;
        }
        let shared = self.shared.clone();
        *task = Some(tokio::spawn(run(shared)));
    }

    /// Transmit `payload` if connected; otherwise a silent no-op. Callers
    /// gate submission on session state, not here.
    pub fn send(&self, payload: String) {
        if *self.shared.state.lock().unwrap() != ConnectionState::Connected {
            debug!("send while not connected; dropping payload");
            return;
        }
        if let Some(tx) = self.shared.outbound.lock().unwrap().as_ref() {
            let _ = tx.send(payload);
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock().unwrap()
    }

    /// Cancel the retry loop and close the current channel. No new event is
    /// emitted once the stopped flag is observed, but an emit racing this
    /// call, or events already queued, may still be read from the listener
    /// channel afterwards; listeners that need a hard cutoff must also stop
    /// consuming (as `Session::stop` does).
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
        }
        // Dropping the sender closes the write half's forwarding loop, which
        // closes the socket on the server side.
        *self.shared.outbound.lock().unwrap() = None;
        self.shared.set_state(ConnectionState::Disconnected);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Connect/retry loop. Each attempt opens a fresh WebSocket; every failure
/// or closure, clean or not, takes the same Disconnected-then-retry path.
/// The single `sleep` here is the only pending reconnect timer.
async fn run(shared: Arc<Shared>) {
    loop {
        shared.set_state(ConnectionState::Connecting);
        match tokio_tungstenite::connect_async(shared.url.as_str()).await {
            Ok((ws, _)) => {
                info!(url = %shared.url, "connected");
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                *shared.outbound.lock().unwrap() = Some(outbound_tx);
                shared.set_state(ConnectionState::Connected);
                shared.emit(ConnectionEvent::Connected);

                serve(&shared, ws, outbound_rx).await;

                *shared.outbound.lock().unwrap() = None;
                info!("connection lost");
            }
            Err(e) => {
                debug!(url = %shared.url, error = %e, "connect attempt failed");
            }
        }
        shared.set_state(ConnectionState::Disconnected);
        shared.emit(ConnectionEvent::Disconnected);
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Pump one open channel until it closes or errors: inbound text frames go
/// to the listener, queued outbound payloads go to the socket.
async fn serve(shared: &Shared, ws: WsStream, mut outbound_rx: mpsc::UnboundedReceiver<String>) {
    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    shared.emit(ConnectionEvent::Frame(text));
                }
                Some(Ok(Message::Close(_))) | None => return,
                Some(Ok(_)) => {} // ping/pong/binary: not part of the protocol
                Some(Err(e)) => {
                    warn!(error = %e, "websocket read error");
                    return;
                }
            },
            payload = outbound_rx.recv() => match payload {
                Some(text) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        warn!(error = %e, "websocket send error");
                        return;
                    }
                }
                None => return, // manager dropped the sender on stop()
            },
        }
    }
}
