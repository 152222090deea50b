//! In-memory subscription bookkeeping.
//!
//! A [`SessionMonitoringManager`] exists per [`DataCategory`]; inside it each
//! session owns one [`LocationMonitoringManager`] listing the locations it
//! watches for that category.
//!
//! [`DataCategory`]: crate::model::DataCategory

use std::collections::{BTreeSet, HashMap};

use crate::ids::SessionId;
use crate::model::MonitorMetadata;

/// Locations watched by one session for one data category.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocationMonitoringManager {
    monitored_locations: BTreeSet<String>,
}

impl LocationMonitoringManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching `monitor.location`. Adding twice is a no-op.
    pub fn add_monitor_location(&mut self, monitor: &MonitorMetadata) -> bool {
        self.monitored_locations.insert(monitor.location.clone())
    }

    /// Stop watching `monitor.location`. Returns whether it was watched.
    pub fn remove_monitored_location(&mut self, monitor: &MonitorMetadata) -> bool {
        self.monitored_locations.remove(&monitor.location)
    }

    pub fn monitored_locations(&self) -> &BTreeSet<String> {
        &self.monitored_locations
    }

    pub fn is_monitoring(&self, location: &str) -> bool {
        self.monitored_locations.contains(location)
    }

    pub fn len(&self) -> usize {
        self.monitored_locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitored_locations.is_empty()
    }
}

/// Maps live sessions to the locations they watch for one category.
#[derive(Clone, Debug, Default)]
pub struct SessionMonitoringManager {
    sessions: HashMap<SessionId, LocationMonitoringManager>,
}

impl SessionMonitoringManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, replacing any manager it already had.
    pub fn add_monitoring_session(
        &mut self,
        session_id: SessionId,
        manager: LocationMonitoringManager,
    ) {
        self.sessions.insert(session_id, manager);
    }

    pub fn remove_monitoring_session(
        &mut self,
        session_id: &SessionId,
    ) -> Option<LocationMonitoringManager> {
        self.sessions.remove(session_id)
    }

    pub fn location_monitor_for_session(
        &self,
        session_id: &SessionId,
    ) -> Option<&LocationMonitoringManager> {
        self.sessions.get(session_id)
    }

    pub fn location_monitor_for_session_mut(
        &mut self,
        session_id: &SessionId,
    ) -> Option<&mut LocationMonitoringManager> {
        self.sessions.get_mut(session_id)
    }

    pub fn has_session(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Whether `session_id` watches `location`. Unknown sessions watch nothing.
    pub fn is_session_monitoring(&self, session_id: &SessionId, location: &str) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|m| m.is_monitoring(location))
    }

    /// Union of every location watched by any session.
    pub fn monitored_locations(&self) -> BTreeSet<String> {
        self.sessions
            .values()
            .flat_map(|m| m.monitored_locations().iter().cloned())
            .collect()
    }

    pub fn session_ids(&self) -> impl Iterator<Item = &SessionId> {
        self.sessions.keys()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
