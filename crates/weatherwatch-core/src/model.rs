use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two kinds of reading a session can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    Rainfall,
    Temperature,
}

impl DataCategory {
    pub const ALL: [DataCategory; 2] = [DataCategory::Rainfall, DataCategory::Temperature];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rainfall => "rainfall",
            Self::Temperature => "temperature",
        }
    }
}

impl fmt::Display for DataCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rainfall reading in millimetres.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RainfallData {
    pub rainfall: f64,
    pub timestamp: DateTime<Utc>,
}

/// Temperature reading in degrees Celsius.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemperatureData {
    pub temperature: f64,
    pub timestamp: DateTime<Utc>,
}

/// Readings for one location. A side is `None` when it was not requested
/// or has been filtered out for the receiving session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherLocationData {
    pub location: String,
    pub rainfall_data: Option<RainfallData>,
    pub temperature_data: Option<TemperatureData>,
}

impl WeatherLocationData {
    pub fn new(
        location: impl Into<String>,
        rainfall_data: Option<RainfallData>,
        temperature_data: Option<TemperatureData>,
    ) -> Self {
        Self {
            location: location.into(),
            rainfall_data,
            temperature_data,
        }
    }

    /// Project this record onto the categories a session watches.
    ///
    /// Returns `None` when neither category is wanted.
    pub fn filtered(&self, rainfall: bool, temperature: bool) -> Option<Self> {
        match (rainfall, temperature) {
            (true, true) => Some(self.clone()),
            (true, false) => Some(Self::new(
                self.location.clone(),
                self.rainfall_data.clone(),
                None,
            )),
            (false, true) => Some(Self::new(
                self.location.clone(),
                None,
                self.temperature_data.clone(),
            )),
            (false, false) => None,
        }
    }
}

/// Payload of add/remove monitor requests.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitorMetadata {
    pub location: String,
}

impl MonitorMetadata {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }
}

/// Failure description sent back to a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestError {
    pub message: String,
    pub error: String,
}

impl RequestError {
    pub fn new(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error: error.into(),
        }
    }
}

/// Response to a session request. Exactly one of `data` and `error` is set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestResponse<T> {
    pub data: Option<T>,
    pub error: Option<RequestError>,
}

impl<T> RequestResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: RequestError) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WeatherLocationData {
        let ts = DateTime::parse_from_rfc3339("2017-05-29T11:39:20Z")
            .unwrap()
            .with_timezone(&Utc);
        WeatherLocationData::new(
            "Melbourne",
            Some(RainfallData {
                rainfall: 1.4,
                timestamp: ts,
            }),
            Some(TemperatureData {
                temperature: 12.5,
                timestamp: ts,
            }),
        )
    }

    #[test]
    fn filtered_keeps_requested_sides() {
        let data = sample();
        assert_eq!(data.filtered(true, true), Some(data.clone()));

        let rain = data.filtered(true, false).unwrap();
        assert!(rain.rainfall_data.is_some());
        assert!(rain.temperature_data.is_none());

        let temp = data.filtered(false, true).unwrap();
        assert!(temp.rainfall_data.is_none());
        assert!(temp.temperature_data.is_some());

        assert!(data.filtered(false, false).is_none());
    }

    #[test]
    fn weather_data_uses_camel_case_keys() {
        let json = serde_json::to_value(sample().filtered(true, false).unwrap()).unwrap();
        assert_eq!(json["location"], "Melbourne");
        assert_eq!(json["rainfallData"]["rainfall"], 1.4);
        assert!(json["temperatureData"].is_null());
    }

    #[test]
    fn response_sets_exactly_one_side() {
        let ok = RequestResponse::ok(MonitorMetadata::new("Geelong"));
        assert!(ok.is_ok());
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["data"]["location"], "Geelong");
        assert!(json["error"].is_null());

        let err: RequestResponse<MonitorMetadata> =
            RequestResponse::err(RequestError::new("Could not add monitor", "no session"));
        assert!(!err.is_ok());
        let json = serde_json::to_value(&err).unwrap();
        assert!(json["data"].is_null());
        assert_eq!(json["error"]["error"], "no session");
    }

    #[test]
    fn category_display() {
        assert_eq!(DataCategory::Rainfall.to_string(), "rainfall");
        assert_eq!(DataCategory::Temperature.to_string(), "temperature");
    }
}
