//! Wrapper chains composed around a storage driver
//!
//! A wrapper implements the full [`Storage`] contract and delegates to the
//! next link. Chains are built from `{priority, name, options}` specs:
//!
//! - specs are stable-sorted by ascending priority;
//! - the lowest priority wraps the driver directly, the highest priority
//!   is the outermost link and sees every call first;
//! - equal priorities keep declaration order, so the earlier-declared
//!   wrapper sits closer to the driver.
//!
//! A chain with no wrappers is the driver itself.

pub mod cache;
pub mod log;
pub mod quota;
pub mod readonly;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, StorageError};
use crate::storage::Storage;

use self::cache::MetadataCache;
use self::log::AccessLog;
use self::quota::Quota;
use self::readonly::ReadOnly;

/// A configured wrapper in a mount's chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrapperSpec {
    pub priority: i32,
    pub name: String,
    #[serde(default)]
    pub options: serde_yaml::Value,
}

impl WrapperSpec {
    pub fn new(priority: i32, name: impl Into<String>) -> Self {
        Self {
            priority,
            name: name.into(),
            options: serde_yaml::Value::Null,
        }
    }

    pub fn with_options(mut self, options: serde_yaml::Value) -> Self {
        self.options = options;
        self
    }
}

/// Constructor wrapping the next link of a chain
pub type WrapperFactory = Arc<
    dyn Fn(Arc<dyn Storage>, &serde_yaml::Value) -> Result<Arc<dyn Storage>> + Send + Sync,
>;

/// Named wrapper constructors
#[derive(Clone)]
pub struct WrapperRegistry {
    factories: BTreeMap<String, WrapperFactory>,
}

impl Default for WrapperRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl WrapperRegistry {
    /// Registry with no wrappers
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the built-in `log`, `cache`, `quota` and `readonly` wrappers
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("log", |inner, options| {
            Ok(Arc::new(AccessLog::from_options(inner, options)?) as Arc<dyn Storage>)
        });
        registry.register("cache", |inner, options| {
            Ok(Arc::new(MetadataCache::from_options(inner, options)?) as Arc<dyn Storage>)
        });
        registry.register("quota", |inner, options| {
            Ok(Arc::new(Quota::from_options(inner, options)?) as Arc<dyn Storage>)
        });
        registry.register("readonly", |inner, _| {
            Ok(Arc::new(ReadOnly::new(inner)) as Arc<dyn Storage>)
        });
        registry
    }

    /// Register (or replace) a wrapper constructor
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(Arc<dyn Storage>, &serde_yaml::Value) -> Result<Arc<dyn Storage>>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Fail with `UnknownWrapper` on the first unregistered name
    pub fn validate(&self, specs: &[WrapperSpec]) -> Result<()> {
        match specs.iter().find(|s| !self.contains(&s.name)) {
            Some(spec) => Err(StorageError::UnknownWrapper(spec.name.clone())),
            None => Ok(()),
        }
    }

    /// Compose `specs` around `driver`
    pub fn build_chain(
        &self,
        driver: Arc<dyn Storage>,
        specs: &[WrapperSpec],
    ) -> Result<Arc<dyn Storage>> {
        self.validate(specs)?;

        let mut chain = driver;
        for spec in build_order(specs) {
            let factory = self
                .factories
                .get(&spec.name)
                .ok_or_else(|| StorageError::UnknownWrapper(spec.name.clone()))?;
            chain = factory(chain, &spec.options)?;
            debug!(wrapper = %spec.name, priority = spec.priority, "wrapped");
        }
        Ok(chain)
    }
}

/// Specs in construction order: innermost first
pub fn build_order(specs: &[WrapperSpec]) -> Vec<&WrapperSpec> {
    let mut ordered: Vec<&WrapperSpec> = specs.iter().collect();
    // sort_by_key is stable
    ordered.sort_by_key(|s| s.priority);
    ordered
}

/// Wrapper names in call order: outermost first
pub fn call_order(specs: &[WrapperSpec]) -> Vec<String> {
    build_order(specs)
        .into_iter()
        .rev()
        .map(|s| s.name.clone())
        .collect()
}

const SIZE_UNITS: [(&str, u64); 4] = [
    ("GB", 1 << 30),
    ("MB", 1 << 20),
    ("KB", 1 << 10),
    ("B", 1),
];

/// Byte count for a size option such as `"100MB"`
///
/// Units are binary and case-insensitive; a bare number is bytes. Returns
/// `None` for unparseable input or a value that does not fit in `u64`.
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim().to_ascii_uppercase();
    let (digits, unit) = SIZE_UNITS
        .iter()
        .find_map(|(suffix, unit)| s.strip_suffix(suffix).map(|d| (d, *unit)))
        .unwrap_or((s.as_str(), 1));
    digits.trim().parse::<u64>().ok()?.checked_mul(unit)
}

/// Deserialize wrapper or driver options, treating null as defaults
pub(crate) fn options_or_default<T>(what: &str, options: &serde_yaml::Value) -> Result<T>
where
    T: Default + serde::de::DeserializeOwned,
{
    if options.is_null() {
        return Ok(T::default());
    }
    serde_yaml::from_value(options.clone())
        .map_err(|e| StorageError::Config(format!("{} options: {}", what, e)))
}
