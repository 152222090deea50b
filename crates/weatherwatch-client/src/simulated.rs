use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use weatherwatch_core::client::{WeatherClient, WeatherClientFactory};
use weatherwatch_core::errors::WeatherError;
use weatherwatch_core::model::{RainfallData, TemperatureData};

/// Stations served by the simulated source.
pub const VICTORIAN_LOCATIONS: &[&str] = &[
    "Ballarat",
    "Bendigo",
    "Cape Otway",
    "Geelong",
    "Hamilton",
    "Horsham",
    "Melbourne",
    "Melbourne Airport",
    "Mildura",
    "Mount Buller",
    "Sale",
    "Shepparton",
    "Wangaratta",
    "Warrnambool",
];

/// Offline weather source producing random but plausible readings.
pub struct SimulatedWeatherClient {
    locations: Vec<String>,
    rng: Mutex<StdRng>,
}

impl SimulatedWeatherClient {
    pub fn new(seed: Option<u64>) -> Self {
        Self::with_locations(VICTORIAN_LOCATIONS.iter().map(|s| s.to_string()).collect(), seed)
    }

    pub fn with_locations(locations: Vec<String>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            locations,
            rng: Mutex::new(rng),
        }
    }

    fn ensure_known(&self, location: &str) -> Result<(), WeatherError> {
        if self.locations.iter().any(|l| l == location) {
            Ok(())
        } else {
            Err(WeatherError::UnknownLocation(location.to_string()))
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[async_trait]
impl WeatherClient for SimulatedWeatherClient {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn retrieve_locations(&self) -> Result<Vec<String>, WeatherError> {
        Ok(self.locations.clone())
    }

    async fn retrieve_rainfall(&self, location: &str) -> Result<RainfallData, WeatherError> {
        self.ensure_known(location)?;
        let mut rng = self.rng.lock();
        // Most readings are dry.
        let rainfall = if rng.gen_bool(0.3) {
            round1(rng.gen_range(0.2..25.0))
        } else {
            0.0
        };
        Ok(RainfallData {
            rainfall,
            timestamp: Utc::now(),
        })
    }

    async fn retrieve_temperature(&self, location: &str) -> Result<TemperatureData, WeatherError> {
        self.ensure_known(location)?;
        let temperature = round1(self.rng.lock().gen_range(4.0..38.0));
        Ok(TemperatureData {
            temperature,
            timestamp: Utc::now(),
        })
    }
}

pub struct SimulatedWeatherClientFactory {
    seed: Option<u64>,
}

impl SimulatedWeatherClientFactory {
    pub fn new(seed: Option<u64>) -> Self {
        Self { seed }
    }
}

#[async_trait]
impl WeatherClientFactory for SimulatedWeatherClientFactory {
    async fn create_weather_client(&self) -> Result<Arc<dyn WeatherClient>, WeatherError> {
        tracing::info!(seeded = self.seed.is_some(), "simulated weather client created");
        Ok(Arc::new(SimulatedWeatherClient::new(self.seed)))
    }
}
