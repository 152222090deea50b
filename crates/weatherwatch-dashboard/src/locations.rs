//! Sorted location list shared by every backend a dashboard listens to.

use std::collections::BTreeSet;

/// Key for a location as reported by one backend.
pub fn prefix_location(prefix: &str, location: &str) -> String {
    format!("{prefix}-{location}")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocationMetadata {
    pub location: String,
    /// Prefixed keys of every backend that reports this location.
    pub service_prefixes: BTreeSet<String>,
}

impl LocationMetadata {
    fn new(location: &str, prefixed: String) -> Self {
        Self {
            location: location.to_string(),
            service_prefixes: BTreeSet::from([prefixed]),
        }
    }
}

/// Strictly sorted, duplicate-free list of locations.
#[derive(Clone, Debug, Default)]
pub struct SortedLocations {
    entries: Vec<LocationMetadata>,
}

impl SortedLocations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `prefix` reports `location`. Returns `true` if the
    /// location was not listed before.
    pub fn insert_service_location(&mut self, prefix: &str, location: &str) -> bool {
        let prefixed = prefix_location(prefix, location);
        match self
            .entries
            .binary_search_by(|entry| entry.location.as_str().cmp(location))
        {
            Ok(index) => {
                self.entries[index].service_prefixes.insert(prefixed);
                false
            }
            Err(index) => {
                self.entries
                    .insert(index, LocationMetadata::new(location, prefixed));
                true
            }
        }
    }

    /// Forget everything `prefix` reported. Locations no backend reports
    /// any more are dropped.
    pub fn remove_service(&mut self, prefix: &str) {
        for entry in &mut self.entries {
            let prefixed = prefix_location(prefix, &entry.location);
            entry.service_prefixes.remove(&prefixed);
        }
        self.entries.retain(|entry| !entry.service_prefixes.is_empty());
    }

    pub fn get(&self, location: &str) -> Option<&LocationMetadata> {
        self.entries
            .binary_search_by(|entry| entry.location.as_str().cmp(location))
            .ok()
            .map(|index| &self.entries[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocationMetadata> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
