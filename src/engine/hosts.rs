// SPDX-License-Identifier: Apache-2.0

//! Host registry
//!
//! Immutable name → connection descriptor map, loaded from configuration at
//! start-up and shared read-only by every request.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::observability::Sensitive;

/// One registered database endpoint
#[derive(Debug, Clone)]
pub struct HostEntry {
    pub name: Arc<str>,
    pub descriptor: Sensitive<String>,
}

impl HostEntry {
    pub fn new(name: impl Into<Arc<str>>, descriptor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descriptor: Sensitive::new(descriptor.into()),
        }
    }
}

/// Registered hosts, ordered by name
#[derive(Debug, Clone, Default)]
pub struct HostRegistry {
    hosts: Vec<HostEntry>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from a name → descriptor map.
    pub fn from_map(map: BTreeMap<String, String>) -> Self {
        let hosts = map
            .into_iter()
            .map(|(name, descriptor)| HostEntry::new(name, descriptor))
            .collect();
        Self { hosts }
    }

    /// Registers a host, replacing any entry with the same name
    pub fn insert(&mut self, name: impl Into<Arc<str>>, descriptor: impl Into<String>) {
        let entry = HostEntry::new(name, descriptor);
        match self
            .hosts
            .binary_search_by(|h| h.name.as_ref().cmp(entry.name.as_ref()))
        {
            Ok(idx) => self.hosts[idx] = entry,
            Err(idx) => self.hosts.insert(idx, entry),
        }
    }

    pub fn get(&self, name: &str) -> Option<&HostEntry> {
        self.hosts
            .binary_search_by(|h| h.name.as_ref().cmp(name))
            .ok()
            .map(|idx| &self.hosts[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &HostEntry> {
        self.hosts.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(|h| h.name.as_ref())
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Names of entries whose descriptor is blank.
    pub fn blank_descriptors(&self) -> Vec<&str> {
        self.hosts
            .iter()
            .filter(|h| h.descriptor.is_blank())
            .map(|h| h.name.as_ref())
            .collect()
    }
}
