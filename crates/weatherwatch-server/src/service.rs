//! Service coordinator: owns the per-category subscription managers, the
//! weather client, and the polled location list, and turns session requests
//! and poll results into outbound frames.
//!
//! State lives behind one lock that is never held across an `.await`, so
//! bookkeeping for a request is applied atomically before any upstream call.
//! Replies to a session's requests go out in the order the requests arrived.

use std::collections::HashMap;
use std::future::{self, Future};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use weatherwatch_core::client::{WeatherClient, WeatherClientFactory};
use weatherwatch_core::errors::WeatherError;
use weatherwatch_core::ids::SessionId;
use weatherwatch_core::model::{
    DataCategory, MonitorMetadata, RequestError, RequestResponse, WeatherLocationData,
};
use weatherwatch_core::monitor::{LocationMonitoringManager, SessionMonitoringManager};
use weatherwatch_core::protocol::{ClientMessage, ServerMessage};

use crate::broadcast;
use crate::registry::SessionRegistry;

#[derive(Default)]
struct ServiceState {
    weather_client: Option<Arc<dyn WeatherClient>>,
    locations: Vec<String>,
    successful_client_setup: bool,
    rainfall: SessionMonitoringManager,
    temperature: SessionMonitoringManager,
    last_poll: Option<DateTime<Utc>>,
    /// Last reply task per session; each reply waits for the one before it.
    reply_tails: HashMap<SessionId, JoinHandle<()>>,
}

impl ServiceState {
    fn managers(&self, category: DataCategory) -> &SessionMonitoringManager {
        match category {
            DataCategory::Rainfall => &self.rainfall,
            DataCategory::Temperature => &self.temperature,
        }
    }

    fn managers_mut(&mut self, category: DataCategory) -> &mut SessionMonitoringManager {
        match category {
            DataCategory::Rainfall => &mut self.rainfall,
            DataCategory::Temperature => &mut self.temperature,
        }
    }
}

/// A validated add request, recorded and waiting for its upstream fetch.
struct PendingAdd {
    session_id: SessionId,
    category: DataCategory,
    location: String,
    rainfall: bool,
    temperature: bool,
    client: Arc<dyn WeatherClient>,
}

impl PendingAdd {
    /// Fetch the current reading for the categories the session now watches.
    async fn fetch(self) -> RequestResponse<WeatherLocationData> {
        let result = self
            .client
            .retrieve_weather_location_data(&self.location, self.rainfall, self.temperature)
            .await;

        match result {
            Ok(data) => RequestResponse::ok(data),
            Err(e) => {
                if e.is_location_error() {
                    tracing::warn!(
                        session_id = %self.session_id,
                        category = %self.category,
                        location = %self.location,
                        error = %e,
                        "Weather source rejected location"
                    );
                } else {
                    tracing::error!(
                        session_id = %self.session_id,
                        category = %self.category,
                        location = %self.location,
                        error = %e,
                        "Failed to retrieve weather data for new monitor"
                    );
                }
                RequestResponse::err(RequestError::new(
                    format!("Failed to retrieve weather data for {}", self.location),
                    e.to_string(),
                ))
            }
        }
    }
}

/// Result of one poll cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Locations requested from the weather source.
    pub requested: usize,
    /// Sessions that were sent a `replace_weather_data` frame.
    pub sessions_notified: usize,
}

/// Snapshot for the health endpoint.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub weather_client: Option<String>,
    pub successful_client_setup: bool,
    pub locations: usize,
    pub sessions: usize,
    pub last_poll: Option<DateTime<Utc>>,
}

pub struct MonitoringService {
    registry: Arc<SessionRegistry>,
    state: Mutex<ServiceState>,
}

impl MonitoringService {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            state: Mutex::new(ServiceState::default()),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    // ── Startup ──

    /// Create the weather client and publish the location list.
    ///
    /// Fails only if the client cannot be created; a failed location lookup
    /// is logged and leaves the list empty.
    pub async fn initialise(&self, factory: &dyn WeatherClientFactory) -> Result<(), WeatherError> {
        let client = match factory.create_weather_client().await {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(error = %e, kind = e.error_kind(), "Failed to create weather client");
                return Err(e);
            }
        };
        tracing::info!(client = client.name(), "Weather client created");

        // Tell any consumers that the server reset.
        let _ = self.registry.broadcast(&ServerMessage::RetrievedLocations(Vec::new()));
        let _ = self.registry.broadcast(&ServerMessage::ReplaceWeatherData(Vec::new()));

        {
            let mut state = self.state.lock();
            state.weather_client = Some(Arc::clone(&client));
            state.successful_client_setup = true;
        }
        let _ = self.registry.broadcast(&ServerMessage::SuccessfulServerSetup(true));

        match client.retrieve_locations().await {
            Ok(mut locations) => {
                locations.sort();
                locations.dedup();
                tracing::info!(count = locations.len(), "Retrieved weather locations");
                self.state.lock().locations = locations.clone();
                let _ = self.registry.broadcast(&ServerMessage::RetrievedLocations(locations));
            }
            Err(e) => {
                tracing::error!(error = %e, kind = e.error_kind(), "Failed to retrieve locations");
            }
        }
        Ok(())
    }

    // ── Session lifecycle ──

    /// Register a new session with both category managers and send it the
    /// current location list and setup flag.
    pub fn start_session(&self, session_id: &SessionId) {
        let (locations, setup) = {
            let mut state = self.state.lock();
            for category in DataCategory::ALL {
                state
                    .managers_mut(category)
                    .add_monitoring_session(session_id.clone(), LocationMonitoringManager::new());
            }
            (state.locations.clone(), state.successful_client_setup)
        };
        tracing::info!(session_id = %session_id, "Session started");

        self.registry
            .send_message(session_id, &ServerMessage::RetrievedLocations(locations));
        self.registry
            .send_message(session_id, &ServerMessage::SuccessfulServerSetup(setup));
    }

    /// Drop every subscription the session held. Returns whether it existed.
    pub fn end_session(&self, session_id: &SessionId) -> bool {
        let mut state = self.state.lock();
        state.reply_tails.remove(session_id);
        let mut existed = false;
        for category in DataCategory::ALL {
            existed |= state
                .managers_mut(category)
                .remove_monitoring_session(session_id)
                .is_some();
        }
        if existed {
            tracing::info!(session_id = %session_id, "Session ended");
        }
        existed
    }

    // ── Requests ──

    /// Entry point for raw text frames from a session. Bookkeeping is
    /// applied before this returns; replies are sent from spawned tasks so a
    /// slow weather source doesn't stall other sessions.
    pub fn handle_client_text(self: &Arc<Self>, session_id: &SessionId, text: &str) {
        if !self.registry.contains(session_id) {
            tracing::debug!(session_id = %session_id, "Dropping frame from departed session");
            return;
        }
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.handle_client_message(session_id, message),
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Malformed client frame");
                let reply = ServerMessage::Error(RequestError::new("Malformed request", e.to_string()));
                self.reply_in_order(session_id, future::ready(reply));
            }
        }
    }

    pub fn handle_client_message(self: &Arc<Self>, session_id: &SessionId, message: ClientMessage) {
        let category = message.category();
        if message.is_add() {
            match self.begin_add(session_id, category, message.monitor()) {
                Ok(pending) => {
                    self.reply_in_order(session_id, async move {
                        ServerMessage::monitor_added(category, pending.fetch().await)
                    });
                }
                Err(error) => {
                    let reply = ServerMessage::monitor_added(category, RequestResponse::err(error));
                    self.reply_in_order(session_id, future::ready(reply));
                }
            }
        } else {
            let response = self.apply_remove(session_id, category, message.monitor());
            let reply = ServerMessage::monitor_removed(category, response);
            self.reply_in_order(session_id, future::ready(reply));
        }
    }

    /// Produce `reply` on its own task and send it once every earlier reply
    /// to the same session has been sent.
    fn reply_in_order<F>(self: &Arc<Self>, session_id: &SessionId, reply: F)
    where
        F: Future<Output = ServerMessage> + Send + 'static,
    {
        let mut state = self.state.lock();
        let previous = state.reply_tails.remove(session_id);
        let service = Arc::clone(self);
        let id = session_id.clone();
        let tail = tokio::spawn(async move {
            let message = reply.await;
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            service.registry.send_message(&id, &message);
        });
        state.reply_tails.insert(session_id.clone(), tail);
    }

    /// Record a subscription, fetch its current reading, and answer the
    /// session. Returns the response that was sent.
    pub async fn add_monitor(
        &self,
        session_id: &SessionId,
        category: DataCategory,
        monitor: &MonitorMetadata,
    ) -> RequestResponse<WeatherLocationData> {
        let response = match self.begin_add(session_id, category, monitor) {
            Ok(pending) => pending.fetch().await,
            Err(error) => RequestResponse::err(error),
        };
        self.registry.send_message(
            session_id,
            &ServerMessage::monitor_added(category, response.clone()),
        );
        response
    }

    fn begin_add(
        &self,
        session_id: &SessionId,
        category: DataCategory,
        monitor: &MonitorMetadata,
    ) -> Result<PendingAdd, RequestError> {
        let mut state = self.state.lock();

        if !state.managers(category).has_session(session_id) {
            tracing::error!(session_id = %session_id, "Could not add monitor, no session");
            return Err(RequestError::new(
                format!("Could not add monitor for {}.", monitor.location),
                format!("No session for ID: {session_id}"),
            ));
        }

        let Some(client) = state.weather_client.clone() else {
            return Err(RequestError::new(
                format!("Could not add monitor for {}.", monitor.location),
                WeatherError::NotInitialised.to_string(),
            ));
        };

        if !state.locations.is_empty() && state.locations.binary_search(&monitor.location).is_err() {
            return Err(RequestError::new(
                format!("Could not add monitor for {}.", monitor.location),
                WeatherError::UnknownLocation(monitor.location.clone()).to_string(),
            ));
        }

        if let Some(manager) = state.managers_mut(category).location_monitor_for_session_mut(session_id) {
            manager.add_monitor_location(monitor);
        }
        tracing::info!(
            session_id = %session_id,
            category = %category,
            location = %monitor.location,
            "Added monitor"
        );

        Ok(PendingAdd {
            session_id: session_id.clone(),
            category,
            location: monitor.location.clone(),
            rainfall: state.rainfall.is_session_monitoring(session_id, &monitor.location),
            temperature: state.temperature.is_session_monitoring(session_id, &monitor.location),
            client,
        })
    }

    /// Drop a subscription and echo the monitor back to the session.
    pub fn remove_monitor(
        &self,
        session_id: &SessionId,
        category: DataCategory,
        monitor: &MonitorMetadata,
    ) -> RequestResponse<MonitorMetadata> {
        let response = self.apply_remove(session_id, category, monitor);
        self.registry.send_message(
            session_id,
            &ServerMessage::monitor_removed(category, response.clone()),
        );
        response
    }

    fn apply_remove(
        &self,
        session_id: &SessionId,
        category: DataCategory,
        monitor: &MonitorMetadata,
    ) -> RequestResponse<MonitorMetadata> {
        let removed = {
            let mut state = self.state.lock();
            state
                .managers_mut(category)
                .location_monitor_for_session_mut(session_id)
                .map(|manager| manager.remove_monitored_location(monitor))
        };

        match removed {
            Some(_) => {
                tracing::info!(
                    session_id = %session_id,
                    category = %category,
                    location = %monitor.location,
                    "Removed monitor"
                );
                RequestResponse::ok(monitor.clone())
            }
            None => {
                tracing::error!(session_id = %session_id, "Could not remove monitor, no session");
                RequestResponse::err(RequestError::new(
                    format!("Could not remove monitor for {}.", monitor.location),
                    format!("No session for ID: {session_id}"),
                ))
            }
        }
    }

    // ── Polling ──

    /// Fetch every monitored location once and send each watching session
    /// its filtered view.
    pub async fn poll_once(&self) -> Result<PollOutcome, WeatherError> {
        let (client, locations) = {
            let state = self.state.lock();
            let client = state.weather_client.clone().ok_or(WeatherError::NotInitialised)?;
            (client, broadcast::monitored_union(&state.rainfall, &state.temperature))
        };

        if locations.is_empty() {
            tracing::debug!("No monitored locations, skipping poll");
            return Ok(PollOutcome::default());
        }

        let data = client.retrieve_weather_location_data_list(&locations).await?;
        let retrieved_at = Utc::now();
        tracing::info!(
            items = data.len(),
            at = %retrieved_at.to_rfc3339(),
            "Retrieved weather data"
        );

        let payloads = {
            let mut state = self.state.lock();
            state.last_poll = Some(retrieved_at);
            broadcast::session_payloads(&state.rainfall, &state.temperature, &data)
        };

        let mut sessions_notified = 0;
        for (session_id, payload) in payloads {
            if self
                .registry
                .send_message(&session_id, &ServerMessage::ReplaceWeatherData(payload))
            {
                sessions_notified += 1;
            }
        }

        Ok(PollOutcome {
            requested: locations.len(),
            sessions_notified,
        })
    }

    // ── Introspection ──

    pub fn locations(&self) -> Vec<String> {
        self.state.lock().locations.clone()
    }

    pub fn is_client_ready(&self) -> bool {
        self.state.lock().successful_client_setup
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().rainfall.len()
    }

    /// Locations `session_id` watches for `category`, if the session exists.
    pub fn monitored_locations(
        &self,
        session_id: &SessionId,
        category: DataCategory,
    ) -> Option<Vec<String>> {
        self.state
            .lock()
            .managers(category)
            .location_monitor_for_session(session_id)
            .map(|m| m.monitored_locations().iter().cloned().collect())
    }

    pub fn status(&self) -> ServiceStatus {
        let state = self.state.lock();
        ServiceStatus {
            weather_client: state.weather_client.as_ref().map(|c| c.name().to_string()),
            successful_client_setup: state.successful_client_setup,
            locations: state.locations.len(),
            sessions: state.rainfall.len(),
            last_poll: state.last_poll,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use weatherwatch_client::{MockWeatherClient, MockWeatherClientFactory};

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(raw) = rx.try_recv() {
            out.push(serde_json::from_str(&raw).unwrap());
        }
        out
    }

    async fn ready_service(locations: &[&str]) -> (Arc<MonitoringService>, Arc<MockWeatherClient>) {
        let registry = Arc::new(SessionRegistry::new(64, Duration::from_secs(90)));
        let service = Arc::new(MonitoringService::new(registry));
        let client = Arc::new(MockWeatherClient::new(locations.iter().copied()));
        let factory = MockWeatherClientFactory::ready(Arc::clone(&client));
        service.initialise(&factory).await.unwrap();
        (service, client)
    }

    fn connect(service: &MonitoringService) -> (SessionId, mpsc::Receiver<String>) {
        let (id, mut rx) = service.registry().register();
        service.start_session(&id);
        let _ = drain(&mut rx);
        (id, rx)
    }

    #[tokio::test]
    async fn initialise_sorts_locations_and_flags_setup() {
        let (service, _client) = ready_service(&["Sale", "Ballarat", "Geelong"]).await;
        assert!(service.is_client_ready());
        assert_eq!(service.locations(), vec!["Ballarat", "Geelong", "Sale"]);
    }

    #[tokio::test]
    async fn initialise_broadcasts_reset_then_setup_then_locations() {
        let registry = Arc::new(SessionRegistry::new(64, Duration::from_secs(90)));
        let service = MonitoringService::new(Arc::clone(&registry));
        let (early, mut rx) = registry.register();
        service.start_session(&early);
        assert_eq!(
            drain(&mut rx),
            vec![
                ServerMessage::RetrievedLocations(vec![]),
                ServerMessage::SuccessfulServerSetup(false),
            ]
        );

        let client = Arc::new(MockWeatherClient::new(["Sale", "Bendigo"]));
        service
            .initialise(&MockWeatherClientFactory::ready(client))
            .await
            .unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                ServerMessage::RetrievedLocations(vec![]),
                ServerMessage::ReplaceWeatherData(vec![]),
                ServerMessage::SuccessfulServerSetup(true),
                ServerMessage::RetrievedLocations(vec!["Bendigo".into(), "Sale".into()]),
            ]
        );
    }

    #[tokio::test]
    async fn failed_factory_leaves_service_unready() {
        let registry = Arc::new(SessionRegistry::new(64, Duration::from_secs(90)));
        let service = MonitoringService::new(registry);
        let factory = MockWeatherClientFactory::failing(WeatherError::Unavailable("down".into()));
        assert!(service.initialise(&factory).await.is_err());
        assert!(!service.is_client_ready());
        assert!(matches!(service.poll_once().await, Err(WeatherError::NotInitialised)));
    }

    #[tokio::test]
    async fn failed_location_lookup_still_initialises() {
        struct NoLocations(MockWeatherClient);

        #[async_trait::async_trait]
        impl WeatherClient for NoLocations {
            fn name(&self) -> &str {
                "no-locations"
            }
            async fn retrieve_locations(&self) -> Result<Vec<String>, WeatherError> {
                Err(WeatherError::Network("refused".into()))
            }
            async fn retrieve_rainfall(
                &self,
                location: &str,
            ) -> Result<weatherwatch_core::model::RainfallData, WeatherError> {
                self.0.retrieve_rainfall(location).await
            }
            async fn retrieve_temperature(
                &self,
                location: &str,
            ) -> Result<weatherwatch_core::model::TemperatureData, WeatherError> {
                self.0.retrieve_temperature(location).await
            }
        }

        struct Factory;
        #[async_trait::async_trait]
        impl WeatherClientFactory for Factory {
            async fn create_weather_client(&self) -> Result<Arc<dyn WeatherClient>, WeatherError> {
                Ok(Arc::new(NoLocations(MockWeatherClient::new(["Sale"]))))
            }
        }

        let registry = Arc::new(SessionRegistry::new(64, Duration::from_secs(90)));
        let service = MonitoringService::new(registry);
        service.initialise(&Factory).await.unwrap();
        assert!(service.is_client_ready());
        assert!(service.locations().is_empty());
    }

    #[tokio::test]
    async fn start_session_sends_locations_and_setup() {
        let (service, _client) = ready_service(&["Geelong"]).await;
        let (id, mut rx) = service.registry().register();
        service.start_session(&id);

        assert_eq!(
            drain(&mut rx),
            vec![
                ServerMessage::RetrievedLocations(vec!["Geelong".into()]),
                ServerMessage::SuccessfulServerSetup(true),
            ]
        );
        assert_eq!(service.session_count(), 1);
        assert_eq!(service.monitored_locations(&id, DataCategory::Rainfall), Some(vec![]));
    }

    #[tokio::test]
    async fn add_monitor_fetches_only_watched_categories() {
        let (service, client) = ready_service(&["Geelong", "Sale"]).await;
        client.set_reading("Geelong", 2.5, 13.0);
        let (id, mut rx) = connect(&service);

        let response = service
            .add_monitor(&id, DataCategory::Rainfall, &MonitorMetadata::new("Geelong"))
            .await;
        let data = response.data.clone().unwrap();
        assert_eq!(data.rainfall_data.unwrap().rainfall, 2.5);
        assert!(data.temperature_data.is_none());
        assert_eq!(client.temperature_calls(), 0);
        assert_eq!(
            drain(&mut rx),
            vec![ServerMessage::AddRainfallMonitor(response)]
        );

        let response = service
            .add_monitor(&id, DataCategory::Temperature, &MonitorMetadata::new("Geelong"))
            .await;
        let data = response.data.unwrap();
        assert!(data.rainfall_data.is_some());
        assert_eq!(data.temperature_data.unwrap().temperature, 13.0);
    }

    #[tokio::test]
    async fn add_monitor_rejects_unknown_session() {
        let (service, _client) = ready_service(&["Geelong"]).await;
        let ghost = SessionId::new();
        let response = service
            .add_monitor(&ghost, DataCategory::Rainfall, &MonitorMetadata::new("Geelong"))
            .await;
        let error = response.error.unwrap();
        assert!(error.error.contains(ghost.as_str()));
    }

    #[tokio::test]
    async fn add_monitor_rejects_unknown_location_without_recording() {
        let (service, client) = ready_service(&["Geelong"]).await;
        let (id, _rx) = connect(&service);

        let response = service
            .add_monitor(&id, DataCategory::Temperature, &MonitorMetadata::new("Perth"))
            .await;
        assert!(response.error.unwrap().error.contains("Perth"));
        assert_eq!(service.monitored_locations(&id, DataCategory::Temperature), Some(vec![]));
        assert_eq!(client.temperature_calls(), 0);
    }

    #[tokio::test]
    async fn add_monitor_before_setup_is_rejected() {
        let registry = Arc::new(SessionRegistry::new(64, Duration::from_secs(90)));
        let service = MonitoringService::new(registry);
        let (id, _rx) = connect(&service);

        let response = service
            .add_monitor(&id, DataCategory::Rainfall, &MonitorMetadata::new("Geelong"))
            .await;
        assert!(!response.is_ok());
        assert_eq!(service.monitored_locations(&id, DataCategory::Rainfall), Some(vec![]));
    }

    #[tokio::test]
    async fn failed_fetch_keeps_subscription() {
        let (service, client) = ready_service(&["Geelong"]).await;
        client.fail_location("Geelong", WeatherError::Network("reset".into()));
        let (id, _rx) = connect(&service);

        let response = service
            .add_monitor(&id, DataCategory::Rainfall, &MonitorMetadata::new("Geelong"))
            .await;
        assert!(response.error.unwrap().error.contains("reset"));
        assert_eq!(
            service.monitored_locations(&id, DataCategory::Rainfall),
            Some(vec!["Geelong".to_string()])
        );
    }

    #[tokio::test]
    async fn remove_monitor_echoes_metadata() {
        let (service, _client) = ready_service(&["Geelong"]).await;
        let (id, mut rx) = connect(&service);
        service
            .add_monitor(&id, DataCategory::Rainfall, &MonitorMetadata::new("Geelong"))
            .await;
        let _ = drain(&mut rx);

        let response = service.remove_monitor(&id, DataCategory::Rainfall, &MonitorMetadata::new("Geelong"));
        assert_eq!(response.data, Some(MonitorMetadata::new("Geelong")));
        assert_eq!(service.monitored_locations(&id, DataCategory::Rainfall), Some(vec![]));
        assert_eq!(drain(&mut rx), vec![ServerMessage::RemoveRainfallMonitor(response)]);

        // Removing again still succeeds.
        let again = service.remove_monitor(&id, DataCategory::Rainfall, &MonitorMetadata::new("Geelong"));
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn remove_monitor_for_unknown_session_errors() {
        let (service, _client) = ready_service(&["Geelong"]).await;
        let response = service.remove_monitor(
            &SessionId::new(),
            DataCategory::Temperature,
            &MonitorMetadata::new("Geelong"),
        );
        assert!(response.data.is_none());
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn poll_sends_filtered_payload_once_per_session() {
        let (service, client) = ready_service(&["Ballarat", "Geelong", "Sale"]).await;
        let (rain_only, mut rx_rain) = connect(&service);
        let (both, mut rx_both) = connect(&service);
        let (idle, mut rx_idle) = connect(&service);

        for (id, category, loc) in [
            (&rain_only, DataCategory::Rainfall, "Geelong"),
            (&both, DataCategory::Rainfall, "Sale"),
            (&both, DataCategory::Temperature, "Sale"),
            (&both, DataCategory::Temperature, "Ballarat"),
        ] {
            service.add_monitor(id, category, &MonitorMetadata::new(loc)).await;
        }
        let _ = drain(&mut rx_rain);
        let _ = drain(&mut rx_both);

        let outcome = service.poll_once().await.unwrap();
        assert_eq!(outcome, PollOutcome { requested: 3, sessions_notified: 2 });
        assert_eq!(
            client.list_requests().last().unwrap(),
            &vec!["Ballarat".to_string(), "Geelong".to_string(), "Sale".to_string()]
        );

        let rain_msgs = drain(&mut rx_rain);
        assert_eq!(rain_msgs.len(), 1);
        let ServerMessage::ReplaceWeatherData(rain_payload) = &rain_msgs[0] else {
            panic!("expected replace_weather_data, got {:?}", rain_msgs[0]);
        };
        assert_eq!(rain_payload.len(), 1);
        assert_eq!(rain_payload[0].location, "Geelong");
        assert!(rain_payload[0].temperature_data.is_none());

        let both_msgs = drain(&mut rx_both);
        let ServerMessage::ReplaceWeatherData(both_payload) = &both_msgs[0] else {
            panic!("expected replace_weather_data, got {:?}", both_msgs[0]);
        };
        let names: Vec<&str> = both_payload.iter().map(|d| d.location.as_str()).collect();
        assert_eq!(names, vec!["Ballarat", "Sale"]);
        assert!(both_payload[0].rainfall_data.is_none());
        assert!(both_payload[1].rainfall_data.is_some() && both_payload[1].temperature_data.is_some());

        assert!(drain(&mut rx_idle).is_empty());
        let _ = idle;
    }

    #[tokio::test]
    async fn poll_with_no_monitors_skips_upstream() {
        let (service, client) = ready_service(&["Geelong"]).await;
        let _session = connect(&service);
        let outcome = service.poll_once().await.unwrap();
        assert_eq!(outcome, PollOutcome::default());
        assert!(client.list_requests().is_empty());
    }

    #[tokio::test]
    async fn poll_failure_is_reported() {
        let (service, client) = ready_service(&["Geelong"]).await;
        let (id, _rx) = connect(&service);
        service.add_monitor(&id, DataCategory::Rainfall, &MonitorMetadata::new("Geelong")).await;

        client.set_outage(Some(WeatherError::Unavailable("maintenance".into())));
        assert!(matches!(service.poll_once().await, Err(WeatherError::Unavailable(_))));
        assert!(service.status().last_poll.is_none());
    }

    #[tokio::test]
    async fn ended_session_stops_receiving_and_shrinks_union() {
        let (service, client) = ready_service(&["Geelong", "Sale"]).await;
        let (a, _rx_a) = connect(&service);
        let (b, _rx_b) = connect(&service);
        service.add_monitor(&a, DataCategory::Rainfall, &MonitorMetadata::new("Geelong")).await;
        service.add_monitor(&b, DataCategory::Temperature, &MonitorMetadata::new("Sale")).await;

        assert!(service.end_session(&a));
        assert!(!service.end_session(&a));
        assert_eq!(service.session_count(), 1);

        service.poll_once().await.unwrap();
        assert_eq!(client.list_requests().last().unwrap(), &vec!["Sale".to_string()]);
    }

    #[tokio::test]
    async fn malformed_text_gets_error_frame() {
        let (service, _client) = ready_service(&["Geelong"]).await;
        let (id, mut rx) = connect(&service);
        service.handle_client_text(&id, "{\"event\": \"subscribe\"}");
        tokio::time::sleep(Duration::from_millis(20)).await;
        let msgs = drain(&mut rx);
        assert_eq!(msgs.len(), 1);
        assert!(matches!(msgs[0], ServerMessage::Error(_)));
    }

    #[tokio::test]
    async fn handle_client_message_applies_bookkeeping_immediately() {
        let (service, _client) = ready_service(&["Geelong"]).await;
        let (id, _rx) = connect(&service);
        service.handle_client_message(&id, ClientMessage::add(DataCategory::Temperature, "Geelong"));
        assert_eq!(
            service.monitored_locations(&id, DataCategory::Temperature),
            Some(vec!["Geelong".to_string()])
        );
        service.handle_client_message(&id, ClientMessage::remove(DataCategory::Temperature, "Geelong"));
        assert_eq!(service.monitored_locations(&id, DataCategory::Temperature), Some(vec![]));
    }

    #[tokio::test]
    async fn frames_from_departed_sessions_are_ignored() {
        let (service, client) = ready_service(&["Geelong"]).await;
        let (id, mut rx) = connect(&service);
        service.registry().unregister(&id);

        let add = serde_json::to_string(&ClientMessage::add(DataCategory::Rainfall, "Geelong")).unwrap();
        service.handle_client_text(&id, &add);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(service.monitored_locations(&id, DataCategory::Rainfall), Some(vec![]));
        assert_eq!(client.rainfall_calls(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn replies_follow_request_order_when_fetch_is_slow() {
        struct SlowRainfall(MockWeatherClient);

        #[async_trait::async_trait]
        impl WeatherClient for SlowRainfall {
            fn name(&self) -> &str {
                "slow-rainfall"
            }
            async fn retrieve_locations(&self) -> Result<Vec<String>, WeatherError> {
                self.0.retrieve_locations().await
            }
            async fn retrieve_rainfall(
                &self,
                location: &str,
            ) -> Result<weatherwatch_core::model::RainfallData, WeatherError> {
                tokio::time::sleep(Duration::from_millis(50)).await;
                self.0.retrieve_rainfall(location).await
            }
            async fn retrieve_temperature(
                &self,
                location: &str,
            ) -> Result<weatherwatch_core::model::TemperatureData, WeatherError> {
                self.0.retrieve_temperature(location).await
            }
        }

        struct Factory;
        #[async_trait::async_trait]
        impl WeatherClientFactory for Factory {
            async fn create_weather_client(&self) -> Result<Arc<dyn WeatherClient>, WeatherError> {
                Ok(Arc::new(SlowRainfall(MockWeatherClient::new(["Geelong", "Sale"]))))
            }
        }

        let registry = Arc::new(SessionRegistry::new(64, Duration::from_secs(90)));
        let service = Arc::new(MonitoringService::new(registry));
        service.initialise(&Factory).await.unwrap();
        let (id, mut rx) = connect(&service);

        service.handle_client_message(&id, ClientMessage::add(DataCategory::Rainfall, "Geelong"));
        service.handle_client_message(&id, ClientMessage::remove(DataCategory::Rainfall, "Geelong"));
        service.handle_client_text(&id, "not json");
        service.handle_client_message(&id, ClientMessage::add(DataCategory::Temperature, "Sale"));
        tokio::time::sleep(Duration::from_millis(200)).await;

        let events: Vec<&str> = drain(&mut rx).iter().map(|m| m.event_name()).collect();
        assert_eq!(
            events,
            vec![
                "add_rainfall_monitor",
                "remove_rainfall_monitor",
                "error",
                "add_temperature_monitor",
            ]
        );
        assert_eq!(service.monitored_locations(&id, DataCategory::Rainfall), Some(vec![]));
    }

    #[tokio::test]
    async fn ending_a_session_drops_its_reply_chain() {
        let (service, _client) = ready_service(&["Geelong"]).await;
        let (id, _rx) = connect(&service);
        service.handle_client_message(&id, ClientMessage::remove(DataCategory::Rainfall, "Geelong"));
        assert!(service.state.lock().reply_tails.contains_key(&id));

        service.end_session(&id);
        assert!(!service.state.lock().reply_tails.contains_key(&id));
    }
}
