//! Dashboard-side model of a weather monitoring session.
//!
//! [`DashboardState`] keeps the sorted location list and per-location render
//! info that a frontend needs, folding in frames from one or more servers
//! (each labelled with a service prefix). [`watch`] drives it from a live
//! connection.

pub mod errors;
pub mod locations;
pub mod render;
pub mod session;
pub mod state;

pub use errors::DashboardError;
pub use locations::{prefix_location, LocationMetadata, SortedLocations};
pub use render::render;
pub use session::{watch, WatchRequest};
pub use state::{DashboardState, MonitoredLocationInformation};
