//! Driver Registry
//!
//! Maps connection descriptor schemes to the driver that speaks them.
//! Provides plugin-like architecture for adding new drivers.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::drivers::mysql::MySqlDriver;
use crate::engine::drivers::postgres::PostgresDriver;
use crate::engine::drivers::sqlite::SqliteDriver;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::HostDriver;

/// Registry that holds all available database drivers
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn HostDriver>>,
}

impl DriverRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Registry with the MySQL, PostgreSQL and SQLite drivers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MySqlDriver::new()));
        registry.register(Arc::new(PostgresDriver::new()));
        registry.register(Arc::new(SqliteDriver::new()));
        registry
    }

    /// Registers a new driver
    ///
    /// Every scheme in the driver's `schemes()` is used as a key; later
    /// registrations win.
    pub fn register(&mut self, driver: Arc<dyn HostDriver>) {
        for scheme in driver.schemes() {
            self.drivers
                .insert(scheme.to_ascii_lowercase(), Arc::clone(&driver));
        }
    }

    /// Gets a driver by scheme
    pub fn get(&self, scheme: &str) -> Option<Arc<dyn HostDriver>> {
        self.drivers.get(&scheme.to_ascii_lowercase()).cloned()
    }

    /// Picks the driver for a connection descriptor from its URL scheme.
    pub fn resolve(&self, descriptor: &str) -> EngineResult<Arc<dyn HostDriver>> {
        let scheme = scheme_of(descriptor).ok_or_else(|| {
            EngineError::connection_failed("connection descriptor has no scheme (expected e.g. mysql://…)")
        })?;
        self.get(scheme).ok_or_else(|| {
            EngineError::connection_failed(format!("no driver for scheme '{scheme}'"))
        })
    }

    /// Lists all registered schemes, sorted
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.drivers.keys().map(|s| s.as_str()).collect();
        schemes.sort_unstable();
        schemes
    }

    /// Returns the number of registered schemes
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    /// Returns true if no drivers are registered
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// URL scheme of a descriptor: the leading `[A-Za-z][A-Za-z0-9+.-]*` before `:`
fn scheme_of(descriptor: &str) -> Option<&str> {
    let (scheme, _) = descriptor.trim().split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'))
    {
        Some(scheme)
    } else {
        None
    }
}
