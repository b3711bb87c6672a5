//! Realtime transport: one long-lived WebSocket connection per client.
//!
//! The connection is shared by the whole session. `connect` is
//! idempotent: called while a connection exists it emits a room join for
//! the new context instead of opening a second socket. The last-used join
//! context is remembered and re-emitted automatically after every
//! reconnect, so room membership is never silently lost. The transport
//! replays nothing missed while disconnected; the engine catches up with
//! a scoped reload when it sees `TransportEvent::Connected` again.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use realboard_core::events::{ClientMessage, RoomContext, ServerEvent};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Gave up connecting after {0} attempts")]
    RetriesExhausted(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// What the engine receives from the transport.
#[derive(Debug)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Event(ServerEvent),
}

/// Bounded-retry, fixed-backoff reconnect policy.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_secs(2),
        }
    }
}

enum Command {
    Join(RoomContext),
    Leave(RoomContext),
    Close,
}

enum SessionEnd {
    /// Socket dropped; the supervisor should reconnect.
    Closed,
    /// Explicit close; no reconnect.
    Shutdown,
}

pub struct RealtimeTransport {
    url: String,
    policy: ReconnectPolicy,
    state: Arc<RwLock<ConnectionState>>,
    last_context: Arc<Mutex<Option<RoomContext>>>,
    cmd_tx: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl RealtimeTransport {
    pub fn new(url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            url: url.into(),
            policy,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            last_context: Arc::new(Mutex::new(None)),
            cmd_tx: Mutex::new(None),
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.event_rx.take()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.read().unwrap()
    }

    /// Join context remembered for post-reconnect rejoin.
    pub fn last_context(&self) -> Option<RoomContext> {
        self.last_context.lock().unwrap().clone()
    }

    /// Open the shared connection and join `context`. Idempotent: if a
    /// connection already exists, this only emits a join for the new
    /// context. The first attempt is awaited; later drops reconnect in
    /// the background under the same policy.
    pub async fn connect(&self, context: RoomContext) -> Result<(), TransportError> {
        *self.last_context.lock().unwrap() = Some(context.clone());

        if self.connection_state() != ConnectionState::Disconnected {
            log::debug!("[transport] Already connected, emitting join instead");
            self.send_command(Command::Join(context));
            return Ok(());
        }

        *self.state.write().unwrap() = ConnectionState::Connecting;
        let ws = match connect_with_retry(&self.url, &self.policy).await {
            Ok(ws) => ws,
            Err(e) => {
                *self.state.write().unwrap() = ConnectionState::Disconnected;
                return Err(e);
            }
        };

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        *self.cmd_tx.lock().unwrap() = Some(cmd_tx);

        tokio::spawn(supervise(
            self.url.clone(),
            self.policy,
            self.state.clone(),
            self.last_context.clone(),
            cmd_rx,
            self.event_tx.clone(),
            ws,
        ));
        Ok(())
    }

    /// Join an additional room context. Offline, only the remembered
    /// context is updated; the join frame goes out on reconnect.
    pub fn join(&self, context: RoomContext) {
        *self.last_context.lock().unwrap() = Some(context.clone());
        self.send_command(Command::Join(context));
    }

    pub fn leave(&self, context: RoomContext) {
        let mut last = self.last_context.lock().unwrap();
        if last.as_ref() == Some(&context) {
            *last = None;
        }
        drop(last);
        self.send_command(Command::Leave(context));
    }

    /// Close the connection for good; no reconnect follows.
    pub fn close(&self) {
        self.send_command(Command::Close);
    }

    fn send_command(&self, cmd: Command) {
        let guard = self.cmd_tx.lock().unwrap();
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(cmd).is_err() {
                    log::warn!("[transport] Connection task gone, command dropped");
                }
            }
            None => log::debug!("[transport] Not connected, command deferred"),
        }
    }
}

/// Try to connect up to `policy.max_attempts` times with a fixed backoff
/// between attempts.
async fn connect_with_retry(
    url: &str,
    policy: &ReconnectPolicy,
) -> Result<WsStream, TransportError> {
    for attempt in 1..=policy.max_attempts {
        match tokio_tungstenite::connect_async(url).await {
            Ok((ws, _)) => {
                log::info!("[transport] Connected to {} (attempt {})", url, attempt);
                return Ok(ws);
            }
            Err(e) => {
                log::warn!(
                    "[transport] Connect attempt {}/{} failed: {}",
                    attempt,
                    policy.max_attempts,
                    e
                );
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.backoff).await;
                }
            }
        }
    }
    Err(TransportError::RetriesExhausted(policy.max_attempts))
}

/// Own the connection across sessions: run one session until the socket
/// drops, then reconnect under the policy and rejoin the remembered
/// context. Ends on explicit close or when retries are exhausted.
async fn supervise(
    url: String,
    policy: ReconnectPolicy,
    state: Arc<RwLock<ConnectionState>>,
    last_context: Arc<Mutex<Option<RoomContext>>>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    mut ws: WsStream,
) {
    loop {
        *state.write().unwrap() = ConnectionState::Connected;
        let _ = event_tx.send(TransportEvent::Connected);

        let rejoin = last_context.lock().unwrap().clone();
        let end = run_session(ws, &mut cmd_rx, &last_context, &event_tx, rejoin).await;

        match end {
            SessionEnd::Shutdown => {
                *state.write().unwrap() = ConnectionState::Disconnected;
                log::info!("[transport] Closed");
                return;
            }
            SessionEnd::Closed => {
                *state.write().unwrap() = ConnectionState::Reconnecting;
                let _ = event_tx.send(TransportEvent::Disconnected);
                log::warn!("[transport] Connection lost, reconnecting");
            }
        }

        match connect_with_retry(&url, &policy).await {
            Ok(new_ws) => ws = new_ws,
            Err(e) => {
                // The engine observes Disconnected; a later connect()
                // starts a fresh supervisor.
                *state.write().unwrap() = ConnectionState::Disconnected;
                log::error!("[transport] Reconnect failed: {}", e);
                return;
            }
        }
    }
}

async fn run_session(
    ws: WsStream,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    last_context: &Mutex<Option<RoomContext>>,
    event_tx: &mpsc::UnboundedSender<TransportEvent>,
    rejoin: Option<RoomContext>,
) -> SessionEnd {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

    // Writer half: forward queued frames to the socket.
    let write_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    if let Some(context) = rejoin {
        log::info!("[transport] Rejoining rooms: {:?}", context);
        send_client_message(&out_tx, &ClientMessage::Join { context });
    }

    let end = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Join(context)) => {
                    *last_context.lock().unwrap() = Some(context.clone());
                    send_client_message(&out_tx, &ClientMessage::Join { context });
                }
                Some(Command::Leave(context)) => {
                    send_client_message(&out_tx, &ClientMessage::Leave { context });
                }
                Some(Command::Close) | None => {
                    let _ = out_tx.send(Message::Close(None));
                    break SessionEnd::Shutdown;
                }
            },
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match ServerEvent::parse(&text) {
                        Ok(event) => {
                            let _ = event_tx.send(TransportEvent::Event(event));
                        }
                        // Malformed or unknown frames are dropped at the
                        // boundary, never passed along untyped.
                        Err(e) => log::warn!("[transport] Unparseable event: {}", e),
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = out_tx.send(Message::Pong(data));
                }
                Some(Ok(Message::Close(_))) | None => break SessionEnd::Closed,
                Some(Err(e)) => {
                    log::warn!("[transport] Read error: {}", e);
                    break SessionEnd::Closed;
                }
                _ => {}
            },
        }
    };

    write_task.abort();
    end
}

fn send_client_message(out_tx: &mpsc::UnboundedSender<Message>, msg: &ClientMessage) {
    match serde_json::to_string(msg) {
        Ok(json) => {
            let _ = out_tx.send(Message::Text(json.into()));
        }
        Err(e) => log::error!("[transport] Failed to encode client message: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let t = RealtimeTransport::new("ws://localhost:9", ReconnectPolicy::default());
        assert_eq!(t.connection_state(), ConnectionState::Disconnected);
        assert!(t.last_context().is_none());
    }

    #[test]
    fn test_join_while_disconnected_remembers_context() {
        let t = RealtimeTransport::new("ws://localhost:9", ReconnectPolicy::default());
        t.join(RoomContext::board("b-1"));
        assert_eq!(t.last_context(), Some(RoomContext::board("b-1")));
        t.leave(RoomContext::board("b-1"));
        assert!(t.last_context().is_none());
    }

    #[test]
    fn test_take_event_rx_once() {
        let mut t = RealtimeTransport::new("ws://localhost:9", ReconnectPolicy::default());
        assert!(t.take_event_rx().is_some());
        assert!(t.take_event_rx().is_none());
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_bounded_retries() {
        let policy = ReconnectPolicy {
            max_attempts: 2,
            backoff: Duration::from_millis(10),
        };
        // Port 9 (discard) is not listening.
        let t = RealtimeTransport::new("ws://127.0.0.1:9", policy);
        let err = t.connect(RoomContext::board("b-1")).await.unwrap_err();
        assert!(matches!(err, TransportError::RetriesExhausted(2)));
        assert_eq!(t.connection_state(), ConnectionState::Disconnected);
        // The context is still remembered for a later connect.
        assert_eq!(t.last_context(), Some(RoomContext::board("b-1")));
    }
}
