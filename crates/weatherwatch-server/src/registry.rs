use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use weatherwatch_core::ids::SessionId;
use weatherwatch_core::protocol::ServerMessage;

/// A connected WebSocket session.
pub struct Connection {
    pub id: SessionId,
    tx: mpsc::Sender<String>,
    connected: AtomicBool,
    last_pong: Mutex<Instant>,
}

impl Connection {
    fn new(id: SessionId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            tx,
            connected: AtomicBool::new(true),
            last_pong: Mutex::new(Instant::now()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn record_pong(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    pub fn is_alive(&self, timeout: Duration) -> bool {
        self.last_pong.lock().elapsed() < timeout
    }
}

/// Registry of all connected sessions and their outbound queues.
pub struct SessionRegistry {
    connections: DashMap<SessionId, Arc<Connection>>,
    max_send_queue: usize,
    client_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(max_send_queue: usize, client_timeout: Duration) -> Self {
        Self {
            connections: DashMap::new(),
            max_send_queue,
            client_timeout,
        }
    }

    /// Register a new session and return its id plus the outbound receiver.
    pub fn register(&self) -> (SessionId, mpsc::Receiver<String>) {
        let id = SessionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        self.connections
            .insert(id.clone(), Arc::new(Connection::new(id.clone(), tx)));
        (id, rx)
    }

    /// Remove a session. Returns whether it was registered.
    pub fn unregister(&self, id: &SessionId) -> bool {
        match self.connections.remove(id) {
            Some((_, conn)) => {
                conn.connected.store(false, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Queue a raw frame for one session. Drops the frame if the queue is full.
    pub fn send_to(&self, id: &SessionId, message: String) -> bool {
        let Some(conn) = self.connections.get(id).map(|c| Arc::clone(c.value())) else {
            return false;
        };
        if !conn.is_connected() {
            return false;
        }
        match conn.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(
                    session_id = %id,
                    msg_len = msg.len(),
                    "Send queue full, dropping message"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Serialize and queue a server message for one session.
    pub fn send_message(&self, id: &SessionId, message: &ServerMessage) -> bool {
        match serde_json::to_string(message) {
            Ok(json) => self.send_to(id, json),
            Err(e) => {
                tracing::error!(event = message.event_name(), error = %e, "Failed to serialize server message");
                false
            }
        }
    }

    /// Send a message to every connected session. Returns how many accepted it.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(event = message.event_name(), error = %e, "Failed to serialize broadcast");
                return 0;
            }
        };
        self.session_ids()
            .iter()
            .filter(|id| self.send_to(id, json.clone()))
            .count()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of connected sessions.
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn record_pong(&self, id: &SessionId) {
        if let Some(conn) = self.connections.get(id) {
            conn.record_pong();
        }
    }

    fn mark_disconnected(&self, id: &SessionId) {
        if let Some(conn) = self.connections.get(id) {
            conn.connected.store(false, Ordering::Relaxed);
        }
    }

    /// Remove sessions that haven't answered a ping within the timeout.
    /// Returns the removed ids so their subscriptions can be dropped.
    pub fn cleanup_dead_clients(&self) -> Vec<SessionId> {
        let dead: Vec<SessionId> = self
            .connections
            .iter()
            .filter(|entry| !entry.value().is_alive(self.client_timeout))
            .map(|entry| entry.key().clone())
            .collect();

        for id in &dead {
            self.unregister(id);
            tracing::info!(session_id = %id, "Cleaned up dead session");
        }
        dead
    }
}

/// Drive one WebSocket: a writer forwarding the outbound queue plus pings,
/// and a reader forwarding text frames to `on_message`. Returns when either
/// side stops; the session is unregistered by then.
pub async fn handle_ws_connection(
    socket: WebSocket,
    session_id: SessionId,
    mut rx: mpsc::Receiver<String>,
    registry: Arc<SessionRegistry>,
    on_message: mpsc::Sender<(SessionId, String)>,
    heartbeat_interval: Duration,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_id = session_id.clone();
    let writer_registry = Arc::clone(&registry);
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat_interval);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(session_id = %writer_id, "Sent ping");
                }
            }
        }

        writer_registry.mark_disconnected(&writer_id);
    });

    let reader_id = session_id.clone();
    let reader_registry = Arc::clone(&registry);
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    if on_message
                        .send((reader_id.clone(), text.to_string()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                WsMessage::Pong(_) => reader_registry.record_pong(&reader_id),
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = writer => {},
        _ = reader => {},
    }

    registry.unregister(&session_id);
}
