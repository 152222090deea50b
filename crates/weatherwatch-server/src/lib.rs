//! WebSocket fan-out server for weather monitoring sessions.

pub mod broadcast;
pub mod errors;
pub mod poller;
pub mod registry;
pub mod server;
pub mod service;

pub use errors::ServerError;
pub use registry::SessionRegistry;
pub use server::{cleanup_interval_for, start, AppState, ServerConfig, ServerHandle};
pub use service::{MonitoringService, PollOutcome, ServiceStatus};
