use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use weatherwatch_core::client::WeatherClientFactory;
use weatherwatch_core::ids::SessionId;

use crate::errors::ServerError;
use crate::poller;
use crate::registry::{self, SessionRegistry};
use crate::service::MonitoringService;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_send_queue: usize,
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
    pub poll_interval: Duration,
    pub cleanup_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            max_send_queue: 256,
            heartbeat_interval: Duration::from_secs(30),
            client_timeout: Duration::from_secs(90),
            poll_interval: Duration::from_secs(5),
            cleanup_interval: cleanup_interval_for(Duration::from_secs(90)),
        }
    }
}

impl ServerConfig {
    /// Reject values `tokio::time::interval` or the send queues cannot take.
    pub fn validate(&self) -> Result<(), ServerError> {
        let intervals = [
            ("heartbeat_interval", self.heartbeat_interval),
            ("poll_interval", self.poll_interval),
            ("cleanup_interval", self.cleanup_interval),
        ];
        for (name, interval) in intervals {
            if interval.is_zero() {
                return Err(ServerError::InvalidConfig(format!("{name} must be non-zero")));
            }
        }
        if self.max_send_queue == 0 {
            return Err(ServerError::InvalidConfig("max_send_queue must be non-zero".into()));
        }
        if self.client_timeout <= self.heartbeat_interval {
            return Err(ServerError::InvalidConfig(
                "client_timeout must exceed heartbeat_interval".into(),
            ));
        }
        Ok(())
    }
}

/// Sweep for silent sessions every third of the timeout, so one is dropped
/// at most a third of the timeout late. Clamped to 100ms..=60s.
pub fn cleanup_interval_for(client_timeout: Duration) -> Duration {
    (client_timeout / 3).clamp(Duration::from_millis(100), Duration::from_secs(60))
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MonitoringService>,
    pub registry: Arc<SessionRegistry>,
    pub message_tx: mpsc::Sender<(SessionId, String)>,
    pub heartbeat_interval: Duration,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/locations", get(locations_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind, spawn the background tasks, and start serving.
///
/// The weather client is created on a background task so the socket is
/// accepting sessions before the source is reachable; sessions connecting
/// early are told setup is not yet complete.
pub async fn start(
    config: ServerConfig,
    factory: Arc<dyn WeatherClientFactory>,
) -> Result<ServerHandle, ServerError> {
    config.validate()?;
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    let local_addr = listener.local_addr()?;

    let registry = Arc::new(SessionRegistry::new(
        config.max_send_queue,
        config.client_timeout,
    ));
    let service = Arc::new(MonitoringService::new(Arc::clone(&registry)));

    let (msg_tx, msg_rx) = mpsc::channel::<(SessionId, String)>(1024);
    let messages = tokio::spawn(process_client_messages(msg_rx, Arc::clone(&service)));

    let cleanup = start_cleanup_task(Arc::clone(&service), config.cleanup_interval);

    let startup_service = Arc::clone(&service);
    let poll_interval = config.poll_interval;
    let startup = tokio::spawn(async move {
        if startup_service.initialise(factory.as_ref()).await.is_ok() {
            poller::run_polling(startup_service, poll_interval).await;
        }
    });

    let app_state = AppState {
        service: Arc::clone(&service),
        registry: Arc::clone(&registry),
        message_tx: msg_tx,
        heartbeat_interval: config.heartbeat_interval,
    };
    let router = build_router(app_state);

    tracing::info!(addr = %local_addr, "Weather monitoring server started");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "Server stopped");
        }
    });

    Ok(ServerHandle {
        local_addr,
        service,
        registry,
        tasks: vec![server, messages, cleanup, startup],
    })
}

/// Handle returned by `start()`; keeps background tasks alive.
pub struct ServerHandle {
    local_addr: SocketAddr,
    service: Arc<MonitoringService>,
    registry: Arc<SessionRegistry>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn service(&self) -> &Arc<MonitoringService> {
        &self.service
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Stop serving and cancel polling.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        tracing::info!(sessions = self.registry.count(), "Server shut down");
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a new WebSocket connection for its whole lifetime.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (session_id, rx) = state.registry.register();
    tracing::info!(session_id = %session_id, "WebSocket client connected");
    state.service.start_session(&session_id);

    registry::handle_ws_connection(
        socket,
        session_id.clone(),
        rx,
        Arc::clone(&state.registry),
        state.message_tx,
        state.heartbeat_interval,
    )
    .await;

    state.service.end_session(&session_id);
    tracing::info!(session_id = %session_id, "WebSocket client disconnected");
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    weather_client: Option<String>,
    sessions: usize,
    locations: usize,
    last_poll_at: Option<DateTime<Utc>>,
}

/// 200 once the weather client is up, 503 before that.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.service.status();
    let (http_status, label) = if status.successful_client_setup {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "initialising")
    };

    let body = HealthResponse {
        status: label,
        weather_client: status.weather_client,
        sessions: status.sessions,
        locations: status.locations,
        last_poll_at: status.last_poll,
    };
    (http_status, Json(body))
}

async fn locations_handler(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.service.locations())
}

/// Feed raw frames from every socket into the service.
async fn process_client_messages(
    mut rx: mpsc::Receiver<(SessionId, String)>,
    service: Arc<MonitoringService>,
) {
    while let Some((session_id, raw_message)) = rx.recv().await {
        tracing::debug!(session_id = %session_id, len = raw_message.len(), "Client frame");
        service.handle_client_text(&session_id, &raw_message);
    }
}

/// Periodically drop sessions that stopped answering pings, along with
/// their subscriptions.
pub fn start_cleanup_task(service: Arc<MonitoringService>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = service.registry().cleanup_dead_clients();
            for session_id in &removed {
                service.end_session(session_id);
            }
            if !removed.is_empty() {
                tracing::info!(removed = removed.len(), "Dead session cleanup");
            }
        }
    })
}
