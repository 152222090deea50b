use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::WeatherError;
use crate::model::{RainfallData, TemperatureData, WeatherLocationData};

/// Adapter to an external weather data source.
///
/// Implementors only provide the three primitive lookups; the combined
/// per-location and list retrievals are built on top of them.
#[async_trait]
pub trait WeatherClient: Send + Sync {
    fn name(&self) -> &str;

    async fn retrieve_locations(&self) -> Result<Vec<String>, WeatherError>;

    async fn retrieve_rainfall(&self, location: &str) -> Result<RainfallData, WeatherError>;

    async fn retrieve_temperature(&self, location: &str) -> Result<TemperatureData, WeatherError>;

    /// Fetch the requested categories for one location. Unrequested sides
    /// are left `None` and never hit the source.
    async fn retrieve_weather_location_data(
        &self,
        location: &str,
        rainfall: bool,
        temperature: bool,
    ) -> Result<WeatherLocationData, WeatherError> {
        let rainfall_fut = async {
            if rainfall {
                self.retrieve_rainfall(location).await.map(Some)
            } else {
                Ok(None)
            }
        };
        let temperature_fut = async {
            if temperature {
                self.retrieve_temperature(location).await.map(Some)
            } else {
                Ok(None)
            }
        };
        let (rainfall_data, temperature_data) = futures::try_join!(rainfall_fut, temperature_fut)?;
        Ok(WeatherLocationData::new(location, rainfall_data, temperature_data))
    }

    /// Fetch both categories for every location, in input order.
    async fn retrieve_weather_location_data_list(
        &self,
        locations: &[String],
    ) -> Result<Vec<WeatherLocationData>, WeatherError> {
        let lookups = locations
            .iter()
            .map(|location| self.retrieve_weather_location_data(location, true, true));
        futures::future::try_join_all(lookups).await
    }
}

/// Creates a [`WeatherClient`], typically after connecting to the source.
#[async_trait]
pub trait WeatherClientFactory: Send + Sync {
    async fn create_weather_client(&self) -> Result<Arc<dyn WeatherClient>, WeatherError>;
}
