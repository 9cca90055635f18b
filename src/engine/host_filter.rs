// SPDX-License-Identifier: Apache-2.0

//! Host selection by regular expression on the registry name.

use regex::Regex;

use crate::engine::error::RequestError;
use crate::engine::hosts::{HostEntry, HostRegistry};

/// Compiled host filter. An empty pattern matches every host.
#[derive(Debug, Clone)]
pub struct HostFilter {
    pattern: Option<Regex>,
}

impl HostFilter {
    pub fn all() -> Self {
        Self { pattern: None }
    }

    pub fn new(pattern: &str) -> Result<Self, RequestError> {
        if pattern.is_empty() {
            return Ok(Self::all());
        }
        let regex = Regex::new(pattern).map_err(|source| RequestError::InvalidHostFilter {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            pattern: Some(regex),
        })
    }

    pub fn matches(&self, host_name: &str) -> bool {
        self.pattern
            .as_ref()
            .map(|re| re.is_match(host_name))
            .unwrap_or(true)
    }

    pub fn select<'a>(&self, hosts: &'a HostRegistry) -> Vec<&'a HostEntry> {
        hosts.iter().filter(|h| self.matches(&h.name)).collect()
    }
}

/// Hosts of `registry` whose name matches `pattern`.
pub fn select<'a>(
    registry: &'a HostRegistry,
    pattern: &str,
) -> Result<Vec<&'a HostEntry>, RequestError> {
    Ok(HostFilter::new(pattern)?.select(registry))
}
