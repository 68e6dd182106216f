//! Push-channel connection management with reconnection support.
//!
//! A [`ConnectionManager`] owns at most one supervisor task. The supervisor
//! owns the socket, the [`ReconnectState`] and the per-attempt heartbeat, so
//! the transport and its counters are never shared with anything else.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::{
    sync::{Mutex, broadcast, mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use crate::{
    config::{HeartbeatConfig, SyncConfig},
    domain::{CloseInitiator, ReconnectDecision, ReconnectPolicy, ReconnectState},
    error::ClientError,
    heartbeat::Heartbeat,
    protocol::ClientMessage,
    router::{MessageRouter, Routed},
    store::{ConnectionStatus, SessionStore},
};

/// Close code reported when the stream ends without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

const EVENT_CAPACITY: usize = 64;

/// Lifecycle notifications of the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A socket is being opened; `attempt` is 0 for the first connection of a cycle
    Opening { attempt: u32 },
    /// The socket is open and `joinSession` was sent
    Open,
    Closed { code: Option<u16>, reason: String },
    Error(String),
    /// Waiting before the given reconnect attempt
    Reconnecting { attempt: u32, delay_ms: u64 },
    /// Retries are exhausted
    GaveUp,
}

/// Sender side of the currently open connection, if any.
///
/// Used by the action gateway for best-effort notifications. Messages are
/// dropped when no connection is open.
#[derive(Debug, Clone, Default)]
pub struct PushChannel {
    slot: Arc<Mutex<Option<mpsc::UnboundedSender<ClientMessage>>>>,
}

impl PushChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn attach(&self, sender: mpsc::UnboundedSender<ClientMessage>) {
        *self.slot.lock().await = Some(sender);
    }

    pub(crate) async fn detach(&self) {
        self.slot.lock().await.take();
    }

    /// Queue a message on the open connection. Returns `false` if none is open.
    pub async fn send(&self, message: ClientMessage) -> bool {
        match self.slot.lock().await.as_ref() {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        }
    }
}

struct RunningConnection {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns the push channel of one session view.
pub struct ConnectionManager {
    config: SyncConfig,
    store: Arc<SessionStore>,
    push: PushChannel,
    events: broadcast::Sender<ConnectionEvent>,
    running: Option<RunningConnection>,
}

impl ConnectionManager {
    pub fn new(config: SyncConfig, store: Arc<SessionStore>, push: PushChannel) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            store,
            push,
            events,
            running: None,
        }
    }

    /// Receiver of lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Whether a connection is opening, open, or waiting to reconnect.
    pub fn is_active(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Start connecting to the session's push channel.
    ///
    /// Returns `Ok(false)` without doing anything while a connection is
    /// already opening, open, or reconnecting. After retries were exhausted
    /// this acts as the manual reconnect trigger and starts a fresh cycle.
    pub fn connect(&mut self) -> Result<bool, ClientError> {
        if self.is_active() {
            tracing::debug!("Connection already active, ignoring connect");
            return Ok(false);
        }

        let session_id = self.store.session_id();
        let url = self.config.push_channel_url(&session_id)?;
        let (shutdown, shutdown_rx) = watch::channel(false);

        let supervisor = Supervisor {
            url,
            session_id,
            policy: self.config.reconnect,
            heartbeat: self.config.heartbeat,
            router: MessageRouter::new(self.store.clone()),
            store: self.store.clone(),
            push: self.push.clone(),
            events: self.events.clone(),
            shutdown: shutdown_rx,
        };
        let task = tokio::spawn(supervisor.run());
        self.running = Some(RunningConnection { shutdown, task });

        Ok(true)
    }

    /// Close the connection on purpose. No reconnect is scheduled.
    ///
    /// Waits until the supervisor task has released the socket.
    pub async fn disconnect(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(true);
            if let Err(e) = running.task.await {
                tracing::warn!("Connection task ended abnormally: {}", e);
            }
        }
        self.store.set_connection(ConnectionStatus::Idle);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // Observed by the supervisor as a local close.
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(true);
        }
    }
}

/// How a single connection ended.
#[derive(Debug)]
enum ConnectionEnd {
    Local,
    Remote { code: Option<u16>, reason: String },
    Failed(String),
}

impl ConnectionEnd {
    fn initiator(&self) -> CloseInitiator {
        match self {
            ConnectionEnd::Local => CloseInitiator::Local,
            ConnectionEnd::Remote { .. } | ConnectionEnd::Failed(_) => CloseInitiator::Remote,
        }
    }
}

/// Resolves once a local close was requested or the manager was dropped.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

struct Supervisor {
    url: Url,
    session_id: String,
    policy: ReconnectPolicy,
    heartbeat: HeartbeatConfig,
    router: MessageRouter,
    store: Arc<SessionStore>,
    push: PushChannel,
    events: broadcast::Sender<ConnectionEvent>,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn run(mut self) {
        let mut state = ReconnectState::new();

        loop {
            let end = self.connect_once(&mut state).await;

            match &end {
                ConnectionEnd::Local => {
                    self.emit(ConnectionEvent::Closed {
                        code: None,
                        reason: "closed by client".to_string(),
                    });
                }
                ConnectionEnd::Remote { code, reason } => {
                    tracing::warn!("Connection closed (code: {:?}, reason: '{}')", code, reason);
                    self.emit(ConnectionEvent::Closed {
                        code: *code,
                        reason: reason.clone(),
                    });
                }
                ConnectionEnd::Failed(e) => {
                    tracing::warn!("Connection failed: {}", e);
                    self.emit(ConnectionEvent::Error(e.clone()));
                }
            }

            match state.on_close(end.initiator(), &self.policy) {
                ReconnectDecision::Stop => {
                    tracing::info!("Disconnected from session '{}'", self.session_id);
                    self.store.set_connection(ConnectionStatus::Idle);
                    return;
                }
                ReconnectDecision::GiveUp => {
                    tracing::error!(
                        "Failed to reconnect after {} attempts. Giving up.",
                        self.policy.max_attempts
                    );
                    self.store.set_connection(ConnectionStatus::Disconnected);
                    self.emit(ConnectionEvent::GaveUp);
                    return;
                }
                ReconnectDecision::Retry { attempt, delay } => {
                    tracing::info!(
                        "Reconnecting in {:?}... (attempt {}/{})",
                        delay,
                        attempt,
                        self.policy.max_attempts
                    );
                    self.store
                        .set_connection(ConnectionStatus::Reconnecting { attempt });
                    self.emit(ConnectionEvent::Reconnecting {
                        attempt,
                        delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    });

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = stopped(&mut self.shutdown) => {
                            self.store.set_connection(ConnectionStatus::Idle);
                            self.emit(ConnectionEvent::Closed {
                                code: None,
                                reason: "closed by client".to_string(),
                            });
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn connect_once(&mut self, state: &mut ReconnectState) -> ConnectionEnd {
        if *self.shutdown.borrow() {
            return ConnectionEnd::Local;
        }

        tracing::info!(
            "Connecting to {} (attempt {}/{})",
            self.url,
            state.attempt(),
            self.policy.max_attempts
        );
        self.emit(ConnectionEvent::Opening {
            attempt: state.attempt(),
        });
        if state.attempt() == 0 {
            self.store.set_connection(ConnectionStatus::Connecting);
        }

        let ws_stream = tokio::select! {
            result = connect_async(self.url.as_str()) => match result {
                Ok((ws_stream, _response)) => ws_stream,
                Err(e) => return ConnectionEnd::Failed(e.to_string()),
            },
            _ = stopped(&mut self.shutdown) => return ConnectionEnd::Local,
        };

        state.begin_connection();
        let (mut write, mut read) = ws_stream.split();

        let join = ClientMessage::JoinSession {
            session_id: self.session_id.clone(),
        };
        match join.to_json() {
            Ok(json) => {
                if let Err(e) = write.send(Message::Text(json.into())).await {
                    return ConnectionEnd::Failed(e.to_string());
                }
            }
            Err(e) => return ConnectionEnd::Failed(e.to_string()),
        }

        // Outbound queue, heartbeat and push slot live exactly as long as this socket.
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientMessage>();
        self.push.attach(out_tx.clone()).await;
        let heartbeat = Heartbeat::start(self.heartbeat, out_tx);

        tracing::info!("Connected to session '{}'", self.session_id);
        self.store.set_connection(ConnectionStatus::Connected);
        self.emit(ConnectionEvent::Open);

        let end = loop {
            tokio::select! {
                _ = stopped(&mut self.shutdown) => {
                    let _ = write.send(Message::Close(None)).await;
                    break ConnectionEnd::Local;
                }
                _ = heartbeat.expired() => {
                    let _ = write.send(Message::Close(None)).await;
                    break ConnectionEnd::Remote {
                        code: None,
                        reason: "pong timeout".to_string(),
                    };
                }
                Some(outgoing) = out_rx.recv() => {
                    let json = match outgoing.to_json() {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    tracing::debug!("Sending frame: {}", json);
                    if let Err(e) = write.send(Message::Text(json.into())).await {
                        break ConnectionEnd::Failed(e.to_string());
                    }
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let routed = self.router.handle(text.as_str());
                        if routed == Routed::Pong {
                            heartbeat.pong_received();
                            tracing::debug!("Pong received at {:?}", heartbeat.last_seen_alive());
                        }
                        if routed.confirms_session() && state.confirm_handshake() {
                            tracing::debug!("Session handshake confirmed, attempt counter reset");
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => ConnectionEnd::Remote {
                                code: Some(u16::from(frame.code)),
                                reason: frame.reason.as_str().to_string(),
                            },
                            None => ConnectionEnd::Remote {
                                code: None,
                                reason: "server closed the connection".to_string(),
                            },
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket read error: {}", e);
                        break ConnectionEnd::Remote {
                            code: Some(ABNORMAL_CLOSURE),
                            reason: e.to_string(),
                        };
                    }
                    None => {
                        break ConnectionEnd::Remote {
                            code: Some(ABNORMAL_CLOSURE),
                            reason: "stream ended".to_string(),
                        };
                    }
                },
            }
        };

        self.push.detach().await;
        drop(heartbeat);
        end
    }
}
