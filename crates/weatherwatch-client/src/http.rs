use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;

use weatherwatch_core::client::{WeatherClient, WeatherClientFactory};
use weatherwatch_core::errors::WeatherError;
use weatherwatch_core::model::{RainfallData, TemperatureData};

/// Client for an HTTP/JSON weather service.
///
/// Endpoints, relative to the base URL:
/// - `GET locations` → `["Ballarat", ...]`
/// - `GET locations/{name}/rainfall` → `{"rainfall": 0.4, "timestamp": "..."}`
/// - `GET locations/{name}/temperature` → `{"temperature": 17.2, "timestamp": "..."}`
pub struct HttpWeatherClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpWeatherClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, WeatherError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| WeatherError::Unavailable(format!("invalid base URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(WeatherError::Unavailable(format!(
                "base URL '{base_url}' cannot carry a path"
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WeatherError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        location: Option<&str>,
    ) -> Result<T, WeatherError> {
        tracing::debug!(url = %url, "weather source request");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(WeatherError::from_status(status.as_u16(), body, location));
        }

        resp.json::<T>()
            .await
            .map_err(|e| WeatherError::Decode(e.to_string()))
    }

    fn transport_error(&self, err: reqwest::Error) -> WeatherError {
        if err.is_timeout() {
            WeatherError::Timeout(self.timeout)
        } else {
            WeatherError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl WeatherClient for HttpWeatherClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn retrieve_locations(&self) -> Result<Vec<String>, WeatherError> {
        self.get_json(self.endpoint(&["locations"]), None).await
    }

    async fn retrieve_rainfall(&self, location: &str) -> Result<RainfallData, WeatherError> {
        let url = self.endpoint(&["locations", location, "rainfall"]);
        self.get_json(url, Some(location)).await
    }

    async fn retrieve_temperature(&self, location: &str) -> Result<TemperatureData, WeatherError> {
        let url = self.endpoint(&["locations", location, "temperature"]);
        self.get_json(url, Some(location)).await
    }
}

/// Builds an [`HttpWeatherClient`] and checks the service answers before
/// handing it out.
pub struct HttpWeatherClientFactory {
    base_url: String,
    timeout: Duration,
}

impl HttpWeatherClientFactory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl WeatherClientFactory for HttpWeatherClientFactory {
    async fn create_weather_client(&self) -> Result<Arc<dyn WeatherClient>, WeatherError> {
        let client = HttpWeatherClient::new(&self.base_url, self.timeout)?;
        let locations = client.retrieve_locations().await?;
        tracing::info!(
            base_url = %client.base_url(),
            locations = locations.len(),
            "HTTP weather client connected"
        );
        Ok(Arc::new(client))
    }
}
