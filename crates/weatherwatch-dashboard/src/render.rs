//! Plain-text rendering of the dashboard for the terminal watcher.

use std::fmt::Write;

use crate::state::DashboardState;

pub fn render(state: &DashboardState) -> String {
    let mut out = String::new();
    let status = if state.connected_to_server {
        "connected"
    } else {
        "waiting for server"
    };
    let _ = writeln!(
        out,
        "[{status}] {} locations available, {} monitored",
        state.sorted_locations.len(),
        state.weather_data_map.len()
    );

    let mut keys: Vec<&String> = state.weather_data_map.keys().collect();
    keys.sort();
    for key in keys {
        let info = &state.weather_data_map[key];
        let _ = write!(out, "  {key}:");
        match info.latest() {
            Some(latest) => {
                if info.monitor_rainfall {
                    match &latest.rainfall_data {
                        Some(r) => {
                            let _ = write!(out, " rain {:.1} mm", r.rainfall);
                        }
                        None => out.push_str(" rain -"),
                    }
                }
                if info.monitor_temperature {
                    match &latest.temperature_data {
                        Some(t) => {
                            let _ = write!(out, " temp {:.1} C", t.temperature);
                        }
                        None => out.push_str(" temp -"),
                    }
                }
            }
            None => out.push_str(" no readings"),
        }
        if info.monitor_graph {
            let _ = write!(out, " ({} readings)", info.weather_data_list.len());
        }
        out.push('\n');
    }

    if let Some(error) = &state.last_error {
        let _ = writeln!(out, "  last error: {} ({})", error.message, error.error);
    }
    out
}
