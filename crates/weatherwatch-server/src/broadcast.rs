//! Per-session filtering of polled weather data.

use std::collections::BTreeSet;

use weatherwatch_core::ids::SessionId;
use weatherwatch_core::model::WeatherLocationData;
use weatherwatch_core::monitor::{LocationMonitoringManager, SessionMonitoringManager};

/// Sorted union of every location any session watches in either category.
pub fn monitored_union(
    rainfall: &SessionMonitoringManager,
    temperature: &SessionMonitoringManager,
) -> Vec<String> {
    let mut union = rainfall.monitored_locations();
    union.extend(temperature.monitored_locations());
    union.into_iter().collect()
}

/// The slice of `data` one session should receive.
///
/// Returns `None` when the session watches nothing in either category, in
/// which case no frame is sent at all.
pub fn filter_for_session(
    rainfall: Option<&LocationMonitoringManager>,
    temperature: Option<&LocationMonitoringManager>,
    data: &[WeatherLocationData],
) -> Option<Vec<WeatherLocationData>> {
    let watches_nothing = rainfall.map_or(true, |m| m.is_empty())
        && temperature.map_or(true, |m| m.is_empty());
    if watches_nothing {
        return None;
    }

    let payload = data
        .iter()
        .filter_map(|item| {
            let emit_rainfall = rainfall.is_some_and(|m| m.is_monitoring(&item.location));
            let emit_temperature = temperature.is_some_and(|m| m.is_monitoring(&item.location));
            item.filtered(emit_rainfall, emit_temperature)
        })
        .collect();
    Some(payload)
}

/// Filtered payload for every session that watches something.
pub fn session_payloads(
    rainfall: &SessionMonitoringManager,
    temperature: &SessionMonitoringManager,
    data: &[WeatherLocationData],
) -> Vec<(SessionId, Vec<WeatherLocationData>)> {
    let sessions: BTreeSet<&SessionId> = rainfall
        .session_ids()
        .chain(temperature.session_ids())
        .collect();

    sessions
        .into_iter()
        .filter_map(|id| {
            filter_for_session(
                rainfall.location_monitor_for_session(id),
                temperature.location_monitor_for_session(id),
                data,
            )
            .map(|payload| (id.clone(), payload))
        })
        .collect()
}
