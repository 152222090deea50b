//! Dashboard model: what to render, updated from server frames.

use std::collections::{HashMap, VecDeque};

use weatherwatch_core::model::{
    DataCategory, MonitorMetadata, RequestError, RequestResponse, WeatherLocationData,
};
use weatherwatch_core::protocol::ServerMessage;

use crate::locations::{prefix_location, SortedLocations};

/// Readings kept per location for graphing.
pub const DEFAULT_HISTORY: usize = 20;

/// Render info for one monitored location.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MonitoredLocationInformation {
    pub weather_data_list: VecDeque<WeatherLocationData>,
    pub monitor_rainfall: bool,
    pub monitor_temperature: bool,
    pub monitor_graph: bool,
}

impl MonitoredLocationInformation {
    pub fn latest(&self) -> Option<&WeatherLocationData> {
        self.weather_data_list.back()
    }

    fn set_flag(&mut self, category: DataCategory, value: bool) {
        match category {
            DataCategory::Rainfall => self.monitor_rainfall = value,
            DataCategory::Temperature => self.monitor_temperature = value,
        }
    }

    fn is_monitoring_anything(&self) -> bool {
        self.monitor_rainfall || self.monitor_temperature
    }

    fn push(&mut self, data: WeatherLocationData, cap: usize) {
        self.weather_data_list.push_back(data);
        while self.weather_data_list.len() > cap {
            self.weather_data_list.pop_front();
        }
    }
}

#[derive(Clone, Debug)]
pub struct DashboardState {
    pub sorted_locations: SortedLocations,
    /// Keyed by prefixed location.
    pub weather_data_map: HashMap<String, MonitoredLocationInformation>,
    pub connected_to_server: bool,
    pub last_error: Option<RequestError>,
    history: usize,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(history: usize) -> Self {
        Self {
            sorted_locations: SortedLocations::new(),
            weather_data_map: HashMap::new(),
            connected_to_server: false,
            last_error: None,
            history: history.max(1),
        }
    }

    /// Fold one server frame from the backend labelled `prefix` into the state.
    pub fn apply(&mut self, prefix: &str, message: &ServerMessage) {
        match message {
            ServerMessage::RetrievedLocations(locations) => {
                if locations.is_empty() {
                    self.sorted_locations.remove_service(prefix);
                } else {
                    for location in locations {
                        self.sorted_locations.insert_service_location(prefix, location);
                    }
                }
            }
            ServerMessage::SuccessfulServerSetup(ready) => {
                self.connected_to_server = *ready;
            }
            ServerMessage::AddRainfallMonitor(response) => {
                self.monitor_added(prefix, DataCategory::Rainfall, response);
            }
            ServerMessage::AddTemperatureMonitor(response) => {
                self.monitor_added(prefix, DataCategory::Temperature, response);
            }
            ServerMessage::RemoveRainfallMonitor(response) => {
                self.monitor_removed(prefix, DataCategory::Rainfall, response);
            }
            ServerMessage::RemoveTemperatureMonitor(response) => {
                self.monitor_removed(prefix, DataCategory::Temperature, response);
            }
            ServerMessage::ReplaceWeatherData(list) => {
                for data in list {
                    let key = prefix_location(prefix, &data.location);
                    if let Some(info) = self.weather_data_map.get_mut(&key) {
                        info.push(data.clone(), self.history);
                    }
                }
            }
            ServerMessage::Error(error) => {
                self.last_error = Some(error.clone());
            }
        }
    }

    fn monitor_added(
        &mut self,
        prefix: &str,
        category: DataCategory,
        response: &RequestResponse<WeatherLocationData>,
    ) {
        if let Some(error) = &response.error {
            tracing::warn!(category = %category, error = %error.error, "{}", error.message);
            self.last_error = Some(error.clone());
        }
        if let Some(data) = &response.data {
            let key = prefix_location(prefix, &data.location);
            let info = self.weather_data_map.entry(key).or_default();
            info.set_flag(category, true);
            info.push(data.clone(), self.history);
        }
    }

    fn monitor_removed(
        &mut self,
        prefix: &str,
        category: DataCategory,
        response: &RequestResponse<MonitorMetadata>,
    ) {
        if let Some(error) = &response.error {
            tracing::warn!(category = %category, error = %error.error, "{}", error.message);
            self.last_error = Some(error.clone());
        }
        if let Some(monitor) = &response.data {
            let key = prefix_location(prefix, &monitor.location);
            let drop_entry = match self.weather_data_map.get_mut(&key) {
                Some(info) => {
                    info.set_flag(category, false);
                    !info.is_monitoring_anything()
                }
                None => false,
            };
            if drop_entry {
                self.weather_data_map.remove(&key);
            }
        }
    }

    /// Flip graph display for a prefixed location. Returns the new value.
    pub fn toggle_graph(&mut self, prefixed_location: &str) -> Option<bool> {
        self.weather_data_map.get_mut(prefixed_location).map(|info| {
            info.monitor_graph = !info.monitor_graph;
            info.monitor_graph
        })
    }

    /// Whether the backend labelled `prefix` listed `location`.
    pub fn offers(&self, prefix: &str, location: &str) -> bool {
        let prefixed = prefix_location(prefix, location);
        self.sorted_locations
            .get(location)
            .is_some_and(|entry| entry.service_prefixes.contains(&prefixed))
    }

    #[cfg(test)]
    pub(crate) fn info(&self, prefix: &str, location: &str) -> Option<&MonitoredLocationInformation> {
        self.weather_data_map.get(&prefix_location(prefix, location))
    }
}
