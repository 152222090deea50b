use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use weatherwatch_core::client::{WeatherClient, WeatherClientFactory};
use weatherwatch_core::errors::WeatherError;
use weatherwatch_core::model::{RainfallData, TemperatureData, WeatherLocationData};

/// Scripted weather source for deterministic tests.
///
/// Every known location reports the reading set with [`set_reading`]
/// (default `0.0` mm / `20.0` °C). Failures can be injected per location or
/// for the whole source.
///
/// [`set_reading`]: MockWeatherClient::set_reading
pub struct MockWeatherClient {
    locations: Vec<String>,
    readings: RwLock<HashMap<String, (f64, f64)>>,
    failing_locations: RwLock<HashMap<String, WeatherError>>,
    outage: RwLock<Option<WeatherError>>,
    timestamp: DateTime<Utc>,
    rainfall_calls: AtomicUsize,
    temperature_calls: AtomicUsize,
    list_requests: Mutex<Vec<Vec<String>>>,
}

impl MockWeatherClient {
    pub fn new<I, S>(locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            locations: locations.into_iter().map(Into::into).collect(),
            readings: RwLock::new(HashMap::new()),
            failing_locations: RwLock::new(HashMap::new()),
            outage: RwLock::new(None),
            timestamp: Utc::now(),
            rainfall_calls: AtomicUsize::new(0),
            temperature_calls: AtomicUsize::new(0),
            list_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn set_reading(&self, location: &str, rainfall: f64, temperature: f64) {
        self.readings
            .write()
            .insert(location.to_string(), (rainfall, temperature));
    }

    pub fn fail_location(&self, location: &str, error: WeatherError) {
        self.failing_locations
            .write()
            .insert(location.to_string(), error);
    }

    /// Make every call fail with `error`; `None` restores service.
    pub fn set_outage(&self, error: Option<WeatherError>) {
        *self.outage.write() = error;
    }

    pub fn rainfall_calls(&self) -> usize {
        self.rainfall_calls.load(Ordering::Relaxed)
    }

    pub fn temperature_calls(&self) -> usize {
        self.temperature_calls.load(Ordering::Relaxed)
    }

    /// Location lists passed to [`WeatherClient::retrieve_weather_location_data_list`].
    pub fn list_requests(&self) -> Vec<Vec<String>> {
        self.list_requests.lock().clone()
    }

    fn check(&self, location: &str) -> Result<(f64, f64), WeatherError> {
        if let Some(err) = self.outage.read().clone() {
            return Err(err);
        }
        if let Some(err) = self.failing_locations.read().get(location) {
            return Err(err.clone());
        }
        if !self.locations.iter().any(|l| l == location) {
            return Err(WeatherError::UnknownLocation(location.to_string()));
        }
        Ok(self
            .readings
            .read()
            .get(location)
            .copied()
            .unwrap_or((0.0, 20.0)))
    }
}

#[async_trait]
impl WeatherClient for MockWeatherClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn retrieve_locations(&self) -> Result<Vec<String>, WeatherError> {
        let outage = self.outage.read().clone();
        if let Some(err) = outage {
            return Err(err);
        }
        Ok(self.locations.clone())
    }

    async fn retrieve_rainfall(&self, location: &str) -> Result<RainfallData, WeatherError> {
        self.rainfall_calls.fetch_add(1, Ordering::Relaxed);
        let (rainfall, _) = self.check(location)?;
        Ok(RainfallData {
            rainfall,
            timestamp: self.timestamp,
        })
    }

    async fn retrieve_temperature(&self, location: &str) -> Result<TemperatureData, WeatherError> {
        self.temperature_calls.fetch_add(1, Ordering::Relaxed);
        let (_, temperature) = self.check(location)?;
        Ok(TemperatureData {
            temperature,
            timestamp: self.timestamp,
        })
    }

    async fn retrieve_weather_location_data_list(
        &self,
        locations: &[String],
    ) -> Result<Vec<WeatherLocationData>, WeatherError> {
        self.list_requests.lock().push(locations.to_vec());
        let mut list = Vec::with_capacity(locations.len());
        for location in locations {
            list.push(
                self.retrieve_weather_location_data(location, true, true)
                    .await?,
            );
        }
        Ok(list)
    }
}

/// Factory handing out a shared [`MockWeatherClient`], or failing.
pub struct MockWeatherClientFactory {
    client: Option<Arc<MockWeatherClient>>,
    error: Option<WeatherError>,
}

impl MockWeatherClientFactory {
    pub fn ready(client: Arc<MockWeatherClient>) -> Self {
        Self {
            client: Some(client),
            error: None,
        }
    }

    pub fn failing(error: WeatherError) -> Self {
        Self {
            client: None,
            error: Some(error),
        }
    }
}

#[async_trait]
impl WeatherClientFactory for MockWeatherClientFactory {
    async fn create_weather_client(&self) -> Result<Arc<dyn WeatherClient>, WeatherError> {
        match (&self.client, &self.error) {
            (Some(client), _) => Ok(Arc::clone(client) as Arc<dyn WeatherClient>),
            (None, Some(err)) => Err(err.clone()),
            (None, None) => Err(WeatherError::NotInitialised),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_scripted_readings() {
        let client = MockWeatherClient::new(["Geelong", "Sale"]);
        client.set_reading("Geelong", 4.5, 11.0);

        let geelong = client
            .retrieve_weather_location_data("Geelong", true, true)
            .await
            .unwrap();
        assert_eq!(geelong.rainfall_data.unwrap().rainfall, 4.5);
        assert_eq!(geelong.temperature_data.unwrap().temperature, 11.0);

        let sale = client.retrieve_temperature("Sale").await.unwrap();
        assert_eq!(sale.temperature, 20.0);
        assert_eq!(client.rainfall_calls(), 1);
        assert_eq!(client.temperature_calls(), 2);
    }

    #[tokio::test]
    async fn records_list_requests() {
        let client = MockWeatherClient::new(["Geelong", "Sale"]);
        let request = vec!["Sale".to_string(), "Geelong".to_string()];
        let list = client
            .retrieve_weather_location_data_list(&request)
            .await
            .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(client.list_requests(), vec![request]);
    }

    #[tokio::test]
    async fn outage_fails_everything_until_cleared() {
        let client = MockWeatherClient::new(["Geelong"]);
        client.set_outage(Some(WeatherError::Unavailable("maintenance".into())));
        assert!(client.retrieve_locations().await.is_err());
        assert!(client.retrieve_rainfall("Geelong").await.is_err());

        client.set_outage(None);
        assert!(client.retrieve_rainfall("Geelong").await.is_ok());
    }

    #[tokio::test]
    async fn failing_location_only_affects_that_location() {
        let client = MockWeatherClient::new(["Geelong", "Sale"]);
        client.fail_location("Sale", WeatherError::Network("reset".into()));
        assert!(client.retrieve_rainfall("Geelong").await.is_ok());
        assert!(matches!(
            client.retrieve_rainfall("Sale").await,
            Err(WeatherError::Network(_))
        ));
    }

    #[tokio::test]
    async fn factory_variants() {
        let client = Arc::new(MockWeatherClient::new(["Geelong"]));
        let ready = MockWeatherClientFactory::ready(Arc::clone(&client));
        assert!(ready.create_weather_client().await.is_ok());

        let failing = MockWeatherClientFactory::failing(WeatherError::Unavailable("down".into()));
        assert!(matches!(
            failing.create_weather_client().await.err(),
            Some(WeatherError::Unavailable(_))
        ));
    }
}
