//! Terminal watcher: one WebSocket session driving a [`DashboardState`].

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use weatherwatch_core::model::DataCategory;
use weatherwatch_core::protocol::{ClientMessage, ServerMessage};

use crate::errors::{DashboardError, Result};
use crate::state::DashboardState;

/// Which backend to label updates with and what to subscribe to.
#[derive(Clone, Debug, Default)]
pub struct WatchRequest {
    pub prefix: String,
    pub rainfall: Vec<String>,
    pub temperature: Vec<String>,
}

impl WatchRequest {
    pub fn subscriptions(&self) -> Vec<ClientMessage> {
        let rainfall = self
            .rainfall
            .iter()
            .map(|loc| ClientMessage::add(DataCategory::Rainfall, loc.as_str()));
        let temperature = self
            .temperature
            .iter()
            .map(|loc| ClientMessage::add(DataCategory::Temperature, loc.as_str()));
        rainfall.chain(temperature).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rainfall.is_empty() && self.temperature.is_empty()
    }

    /// Requested locations the server has not listed under this prefix.
    pub fn unlisted<'a>(&'a self, state: &DashboardState) -> Vec<&'a str> {
        let mut unlisted: Vec<&str> = self
            .rainfall
            .iter()
            .chain(&self.temperature)
            .map(String::as_str)
            .filter(|location| !state.offers(&self.prefix, location))
            .collect();
        unlisted.sort_unstable();
        unlisted.dedup();
        unlisted
    }
}

/// Connect to `url`, subscribe once the server reports setup, and apply
/// every frame to a fresh state. `on_update` runs after each applied frame.
///
/// Returns the final state when the server closes the connection.
pub async fn watch<F>(url: &str, request: &WatchRequest, mut on_update: F) -> Result<DashboardState>
where
    F: FnMut(&DashboardState),
{
    let (ws, _) = connect_async(url).await?;
    tracing::info!(url, prefix = %request.prefix, "Connected to weather server");
    let (mut sink, mut stream) = ws.split();

    let mut state = DashboardState::new();
    let mut subscribed = false;

    while let Some(frame) = stream.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let message: ServerMessage = match serde_json::from_str(text.as_str()) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unrecognised server frame");
                continue;
            }
        };
        tracing::debug!(event = message.event_name(), "Server frame");
        state.apply(&request.prefix, &message);

        if !subscribed && matches!(message, ServerMessage::SuccessfulServerSetup(true)) {
            let unlisted = request.unlisted(&state);
            if !state.sorted_locations.is_empty() && !unlisted.is_empty() {
                tracing::warn!(locations = ?unlisted, "Subscribing to locations the server did not list");
            }
            for subscription in request.subscriptions() {
                let json = serde_json::to_string(&subscription)?;
                sink.send(Message::Text(json.into())).await?;
            }
            subscribed = true;
            tracing::info!(
                rainfall = request.rainfall.len(),
                temperature = request.temperature.len(),
                "Subscriptions sent"
            );
        }

        on_update(&state);
    }

    if !subscribed && !request.is_empty() {
        return Err(DashboardError::ClosedBeforeSetup);
    }
    Ok(state)
}
