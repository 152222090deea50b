pub mod client;
pub mod errors;
pub mod ids;
pub mod model;
pub mod monitor;
pub mod protocol;

pub use client::{WeatherClient, WeatherClientFactory};
pub use errors::WeatherError;
pub use ids::SessionId;
pub use model::{
    DataCategory, MonitorMetadata, RainfallData, RequestError, RequestResponse, TemperatureData,
    WeatherLocationData,
};
pub use monitor::{LocationMonitoringManager, SessionMonitoringManager};
pub use protocol::{ClientMessage, ServerMessage};
