//! Storage driver factory
//!
//! Drivers are constructed by name from opaque mount options. Only the
//! in-memory reference driver is built in; embedders register their own.

pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, StorageError};
use crate::storage::Storage;

use self::memory::MemoryDriver;

/// Constructor for a named driver
pub type DriverFactory =
    Arc<dyn Fn(&serde_yaml::Value) -> Result<Arc<dyn Storage>> + Send + Sync>;

/// Named driver constructors
#[derive(Clone)]
pub struct DriverRegistry {
    factories: BTreeMap<String, DriverFactory>,
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl DriverRegistry {
    /// Registry with no drivers
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the built-in `memory` driver
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("memory", |options| {
            Ok(Arc::new(MemoryDriver::from_options(options)?) as Arc<dyn Storage>)
        });
        registry
    }

    /// Register (or replace) a driver constructor
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&serde_yaml::Value) -> Result<Arc<dyn Storage>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Construct the driver named `name`
    pub fn build(&self, name: &str, options: &serde_yaml::Value) -> Result<Arc<dyn Storage>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| StorageError::UnsupportedDriver(name.to_string()))?;
        debug!(driver = name, "constructing driver");
        factory(options)
    }
}
