use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("server closed the connection before setup completed")]
    ClosedBeforeSetup,
}

pub type Result<T> = std::result::Result<T, DashboardError>;
