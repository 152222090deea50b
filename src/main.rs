//! # weatherwatch
//!
//! `serve` runs the monitoring server; `watch` connects a terminal dashboard
//! to a running server.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use weatherwatch_client::{HttpWeatherClientFactory, SimulatedWeatherClientFactory};
use weatherwatch_core::WeatherClientFactory;
use weatherwatch_dashboard::WatchRequest;
use weatherwatch_settings::{SourceKind, WeatherSettings};
use weatherwatch_telemetry::TelemetryConfig;

/// Real-time weather monitoring over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "weatherwatch", about = "Weather monitoring server and dashboard")]
struct Cli {
    /// Settings file (defaults to ~/.weatherwatch/settings.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the monitoring server.
    Serve {
        /// Host to bind.
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (0 for auto-assign).
        #[arg(long)]
        port: Option<u16>,

        /// Milliseconds between weather polls.
        #[arg(long)]
        poll_interval_ms: Option<u64>,

        /// Weather source: `simulated` or `http`.
        #[arg(long)]
        source: Option<String>,

        /// Base URL of the HTTP weather source.
        #[arg(long)]
        source_url: Option<String>,

        /// Seed for the simulated source.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print live dashboard updates from a running server.
    Watch {
        /// WebSocket endpoint of the server.
        #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
        url: String,

        /// Label for this server's entries.
        #[arg(long, default_value = "weather")]
        service: String,

        /// Location to monitor for rainfall (repeatable).
        #[arg(long = "rainfall")]
        rainfall: Vec<String>,

        /// Location to monitor for temperature (repeatable).
        #[arg(long = "temperature")]
        temperature: Vec<String>,
    },
}

#[derive(Debug, Default)]
struct ServeOverrides {
    host: Option<String>,
    port: Option<u16>,
    poll_interval_ms: Option<u64>,
    source: Option<String>,
    source_url: Option<String>,
    seed: Option<u64>,
}

fn load_settings(config: Option<&PathBuf>) -> Result<WeatherSettings> {
    let settings = match config {
        Some(path) => weatherwatch_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => weatherwatch_settings::load_settings().context("Failed to load settings")?,
    };
    Ok(settings)
}

fn apply_cli_overrides(settings: &mut WeatherSettings, overrides: ServeOverrides) -> Result<()> {
    if let Some(host) = overrides.host {
        settings.server.host = host;
    }
    if let Some(port) = overrides.port {
        settings.server.port = port;
    }
    if let Some(interval) = overrides.poll_interval_ms {
        settings.polling.interval_ms = interval;
    }
    if let Some(source) = overrides.source {
        settings.source.kind = source.parse::<SourceKind>()?;
    }
    if let Some(url) = overrides.source_url {
        settings.source.base_url = Some(url);
    }
    if let Some(seed) = overrides.seed {
        settings.source.seed = Some(seed);
    }
    settings.validate().context("Invalid settings")?;
    Ok(())
}

fn init_logging(settings: &WeatherSettings) -> Result<()> {
    weatherwatch_telemetry::init_telemetry(&TelemetryConfig {
        log_level: settings.logging.level.clone(),
        module_levels: Vec::new(),
        json: settings.logging.json,
    })
    .context("Failed to initialise logging")
}

fn build_factory(settings: &WeatherSettings) -> Result<Arc<dyn WeatherClientFactory>> {
    let factory: Arc<dyn WeatherClientFactory> = match settings.source.kind {
        SourceKind::Simulated => Arc::new(SimulatedWeatherClientFactory::new(settings.source.seed)),
        SourceKind::Http => {
            let base_url = settings
                .source
                .base_url
                .clone()
                .context("source.baseUrl is required for the http source")?;
            Arc::new(HttpWeatherClientFactory::new(
                base_url,
                Duration::from_millis(settings.source.request_timeout_ms),
            ))
        }
    };
    Ok(factory)
}

fn server_config(settings: &WeatherSettings) -> weatherwatch_server::ServerConfig {
    let client_timeout = Duration::from_millis(settings.server.client_timeout_ms);
    weatherwatch_server::ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        max_send_queue: settings.server.max_send_queue,
        heartbeat_interval: Duration::from_millis(settings.server.heartbeat_interval_ms),
        client_timeout,
        poll_interval: Duration::from_millis(settings.polling.interval_ms),
        cleanup_interval: weatherwatch_server::cleanup_interval_for(client_timeout),
    }
}

async fn serve(settings: WeatherSettings) -> Result<()> {
    let factory = build_factory(&settings)?;
    let handle = weatherwatch_server::start(server_config(&settings), factory)
        .await
        .context("Failed to start server")?;

    tracing::info!(
        addr = %handle.local_addr(),
        source = ?settings.source.kind,
        poll_interval_ms = settings.polling.interval_ms,
        "Weather server ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    tracing::info!("Shutting down");
    handle.shutdown();
    Ok(())
}

async fn watch(request: WatchRequest, url: String) -> Result<()> {
    let state = weatherwatch_dashboard::watch(&url, &request, |state| {
        println!("{}", weatherwatch_dashboard::render(state));
    })
    .await
    .with_context(|| format!("Dashboard session with {url} failed"))?;

    tracing::info!(monitored = state.weather_data_map.len(), "Server closed the connection");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_ref())?;

    match cli.command {
        Command::Serve {
            host,
            port,
            poll_interval_ms,
            source,
            source_url,
            seed,
        } => {
            apply_cli_overrides(
                &mut settings,
                ServeOverrides {
                    host,
                    port,
                    poll_interval_ms,
                    source,
                    source_url,
                    seed,
                },
            )?;
            init_logging(&settings)?;
            serve(settings).await
        }
        Command::Watch {
            url,
            service,
            rainfall,
            temperature,
        } => {
            init_logging(&settings)?;
            let request = WatchRequest {
                prefix: service,
                rainfall,
                temperature,
            };
            watch(request, url).await
        }
    }
}
