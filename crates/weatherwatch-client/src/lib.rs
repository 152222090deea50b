pub mod http;
pub mod mock;
pub mod simulated;

pub use http::{HttpWeatherClient, HttpWeatherClientFactory};
pub use mock::{MockWeatherClient, MockWeatherClientFactory};
pub use simulated::{SimulatedWeatherClient, SimulatedWeatherClientFactory, VICTORIAN_LOCATIONS};
