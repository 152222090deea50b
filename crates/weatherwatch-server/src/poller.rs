//! Periodic weather refresh.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::service::MonitoringService;

/// Poll forever. The first cycle runs immediately; a slow cycle delays the
/// next one rather than bunching ticks.
pub async fn run_polling(service: Arc<MonitoringService>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(interval_ms = interval.as_millis() as u64, "Polling started");

    loop {
        ticker.tick().await;
        match service.poll_once().await {
            Ok(outcome) if outcome.requested > 0 => {
                tracing::debug!(
                    requested = outcome.requested,
                    sessions = outcome.sessions_notified,
                    "Poll complete"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, kind = e.error_kind(), "Poll failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SessionRegistry;
    use weatherwatch_client::{MockWeatherClient, MockWeatherClientFactory};
    use weatherwatch_core::model::{DataCategory, MonitorMetadata};

    #[tokio::test(start_paused = true)]
    async fn polls_on_every_tick() {
        let registry = Arc::new(SessionRegistry::new(64, Duration::from_secs(90)));
        let service = Arc::new(MonitoringService::new(Arc::clone(&registry)));
        let client = Arc::new(MockWeatherClient::new(["Geelong"]));
        service
            .initialise(&MockWeatherClientFactory::ready(Arc::clone(&client)))
            .await
            .unwrap();

        let (id, _rx) = registry.register();
        service.start_session(&id);
        service
            .add_monitor(&id, DataCategory::Rainfall, &MonitorMetadata::new("Geelong"))
            .await;

        let handle = tokio::spawn(run_polling(Arc::clone(&service), Duration::from_secs(5)));
        tokio::time::sleep(Duration::from_millis(12_500)).await;
        handle.abort();

        // Immediate tick plus two more.
        assert_eq!(client.list_requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_poll_keeps_running() {
        let registry = Arc::new(SessionRegistry::new(64, Duration::from_secs(90)));
        let service = Arc::new(MonitoringService::new(Arc::clone(&registry)));
        let client = Arc::new(MockWeatherClient::new(["Sale"]));
        service
            .initialise(&MockWeatherClientFactory::ready(Arc::clone(&client)))
            .await
            .unwrap();
        let (id, _rx) = registry.register();
        service.start_session(&id);
        service
            .add_monitor(&id, DataCategory::Temperature, &MonitorMetadata::new("Sale"))
            .await;

        client.set_outage(Some(weatherwatch_core::WeatherError::Network("down".into())));
        let handle = tokio::spawn(run_polling(Arc::clone(&service), Duration::from_secs(1)));
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        handle.abort();

        assert_eq!(client.list_requests().len(), 3);
        assert!(service.status().last_poll.is_none());
    }
}
