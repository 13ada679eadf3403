//! Configuration parsing and structures

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use serde::Deserialize;

use crate::env::expand_env;
use crate::mount::{MountOptions, MountTable, MountTableEntry};
use crate::wrapper::WrapperSpec;

// =============================================================================
// Raw Config (Deserialized from YAML)
// =============================================================================

/// Raw configuration as deserialized from YAML.
/// This is converted to `Config` via `resolve()`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Defaults inherited by every mount
    #[serde(default)]
    pub defaults: MountDefaults,

    /// Mount table
    pub mounts: Vec<RawMountConfig>,
}

/// Top-level mount defaults section
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MountDefaults {
    /// Driver options keyed by driver name
    #[serde(default)]
    pub drivers: BTreeMap<String, serde_yaml::Value>,

    /// Wrapper chain for mounts that declare none
    #[serde(default)]
    pub wrappers: Vec<WrapperSpec>,

    /// Mount read-only unless the mount says otherwise
    #[serde(default)]
    pub read_only: bool,
}

/// Raw mount configuration before resolution
#[derive(Debug, Clone, Deserialize)]
pub struct RawMountConfig {
    /// Path form of the mount point, e.g. `/home`
    pub path: String,

    /// Namespace id, e.g. `home`
    pub id: String,

    /// Driver name
    pub driver: String,

    /// Driver options, merged over `defaults.drivers.<driver>`
    pub driver_options: Option<serde_yaml::Value>,

    /// Read-only override
    pub read_only: Option<bool>,

    /// Wrapper chain override
    pub wrappers: Option<Vec<WrapperSpec>>,
}

// =============================================================================
// Resolved Config (Ready for use)
// =============================================================================

/// Top-level configuration (resolved from RawConfig)
#[derive(Debug, Clone)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Mount table entries (fully resolved)
    pub mounts: Vec<MountTableEntry>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// =============================================================================
// Resolution Logic
// =============================================================================

impl RawConfig {
    /// Resolve raw config into final config by merging mount overrides with defaults
    pub fn resolve(self) -> Result<Config, ConfigError> {
        let RawConfig {
            logging,
            defaults,
            mounts,
        } = self;

        let mounts = mounts
            .into_iter()
            .map(|raw| Self::resolve_mount(&defaults, raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Config { logging, mounts })
    }

    fn resolve_mount(
        defaults: &MountDefaults,
        raw: RawMountConfig,
    ) -> Result<MountTableEntry, ConfigError> {
        let driver_options = Self::merge_driver_options(
            defaults.drivers.get(&raw.driver),
            raw.driver_options,
            &raw.path,
        )?;

        Ok(MountTableEntry {
            mount_point: raw.path,
            mount_point_id: raw.id,
            mount_options: MountOptions {
                read_only: raw.read_only.unwrap_or(defaults.read_only),
            },
            driver: raw.driver,
            driver_options,
            wrappers: raw.wrappers.unwrap_or_else(|| defaults.wrappers.clone()),
        })
    }

    /// Mount keys override default keys; non-mapping options replace wholesale
    fn merge_driver_options(
        defaults: Option<&serde_yaml::Value>,
        mount: Option<serde_yaml::Value>,
        mount_path: &str,
    ) -> Result<serde_yaml::Value, ConfigError> {
        match (defaults.cloned(), mount) {
            (None, None) => Ok(serde_yaml::Value::Null),
            (Some(d), None) => Ok(d),
            (None, Some(m)) => Ok(m),
            (Some(serde_yaml::Value::Mapping(mut base)), Some(serde_yaml::Value::Mapping(over))) => {
                for (k, v) in over {
                    base.insert(k, v);
                }
                Ok(serde_yaml::Value::Mapping(base))
            }
            (Some(_), Some(serde_yaml::Value::Null)) => Err(ConfigError::ValidationError(format!(
                "Mount {:?}: driver_options cannot be null when driver defaults exist",
                mount_path
            ))),
            (Some(_), Some(m)) => Ok(m),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.clone(), e.to_string()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string, expanding `${VAR}` references in values
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let mut doc: serde_yaml::Value =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        expand_env(&mut doc)?;
        let raw: RawConfig =
            serde_yaml::from_value(doc).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        raw.resolve()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mounts.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one mount point is required".to_string(),
            ));
        }

        let mut paths = HashSet::new();
        let mut ids = HashSet::new();
        for mount in &self.mounts {
            mount.validate().map_err(|e| {
                ConfigError::ValidationError(format!("Mount {:?}: {}", mount.mount_point, e))
            })?;
            if !paths.insert(&mount.mount_point) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate mount path: {:?}",
                    mount.mount_point
                )));
            }
            if !ids.insert(&mount.mount_point_id) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate mount id: {:?}",
                    mount.mount_point_id
                )));
            }
        }

        Ok(())
    }

    /// Resolved mounts as a mount table
    pub fn mount_table(&self) -> MountTable {
        MountTable {
            mounts: self.mounts.clone(),
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
