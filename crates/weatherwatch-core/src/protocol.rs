//! JSON wire messages exchanged over the dashboard WebSocket.
//!
//! Every frame is `{"event": "<name>", "data": <payload>}`. Add/remove
//! responses reuse the request's event name so a dashboard can correlate them
//! without request ids.

use serde::{Deserialize, Serialize};

use crate::model::{DataCategory, MonitorMetadata, RequestError, RequestResponse, WeatherLocationData};

/// Frames sent by a dashboard session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    AddRainfallMonitor(MonitorMetadata),
    RemoveRainfallMonitor(MonitorMetadata),
    AddTemperatureMonitor(MonitorMetadata),
    RemoveTemperatureMonitor(MonitorMetadata),
}

impl ClientMessage {
    pub fn add(category: DataCategory, location: impl Into<String>) -> Self {
        let monitor = MonitorMetadata::new(location);
        match category {
            DataCategory::Rainfall => Self::AddRainfallMonitor(monitor),
            DataCategory::Temperature => Self::AddTemperatureMonitor(monitor),
        }
    }

    pub fn remove(category: DataCategory, location: impl Into<String>) -> Self {
        let monitor = MonitorMetadata::new(location);
        match category {
            DataCategory::Rainfall => Self::RemoveRainfallMonitor(monitor),
            DataCategory::Temperature => Self::RemoveTemperatureMonitor(monitor),
        }
    }

    pub fn category(&self) -> DataCategory {
        match self {
            Self::AddRainfallMonitor(_) | Self::RemoveRainfallMonitor(_) => DataCategory::Rainfall,
            Self::AddTemperatureMonitor(_) | Self::RemoveTemperatureMonitor(_) => {
                DataCategory::Temperature
            }
        }
    }

    pub fn monitor(&self) -> &MonitorMetadata {
        match self {
            Self::AddRainfallMonitor(m)
            | Self::RemoveRainfallMonitor(m)
            | Self::AddTemperatureMonitor(m)
            | Self::RemoveTemperatureMonitor(m) => m,
        }
    }

    pub fn is_add(&self) -> bool {
        matches!(self, Self::AddRainfallMonitor(_) | Self::AddTemperatureMonitor(_))
    }
}

/// Frames pushed by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    RetrievedLocations(Vec<String>),
    SuccessfulServerSetup(bool),
    AddRainfallMonitor(RequestResponse<WeatherLocationData>),
    RemoveRainfallMonitor(RequestResponse<MonitorMetadata>),
    AddTemperatureMonitor(RequestResponse<WeatherLocationData>),
    RemoveTemperatureMonitor(RequestResponse<MonitorMetadata>),
    ReplaceWeatherData(Vec<WeatherLocationData>),
    Error(RequestError),
}

impl ServerMessage {
    pub fn monitor_added(
        category: DataCategory,
        response: RequestResponse<WeatherLocationData>,
    ) -> Self {
        match category {
            DataCategory::Rainfall => Self::AddRainfallMonitor(response),
            DataCategory::Temperature => Self::AddTemperatureMonitor(response),
        }
    }

    pub fn monitor_removed(category: DataCategory, response: RequestResponse<MonitorMetadata>) -> Self {
        match category {
            DataCategory::Rainfall => Self::RemoveRainfallMonitor(response),
            DataCategory::Temperature => Self::RemoveTemperatureMonitor(response),
        }
    }

    /// Event name as it appears on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::RetrievedLocations(_) => "retrieved_locations",
            Self::SuccessfulServerSetup(_) => "successful_server_setup",
            Self::AddRainfallMonitor(_) => "add_rainfall_monitor",
            Self::RemoveRainfallMonitor(_) => "remove_rainfall_monitor",
            Self::AddTemperatureMonitor(_) => "add_temperature_monitor",
            Self::RemoveTemperatureMonitor(_) => "remove_temperature_monitor",
            Self::ReplaceWeatherData(_) => "replace_weather_data",
            Self::Error(_) => "error",
        }
    }
}
