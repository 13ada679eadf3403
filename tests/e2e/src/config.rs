//! Configuration builder for e2e tests
//!
//! Generates YAML configuration files that match vfswitch's expected format.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One wrapper in a mount's chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrapperConfig {
    pub priority: i32,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_yaml::Value>,
}

impl WrapperConfig {
    pub fn new(priority: i32, name: &str) -> Self {
        Self {
            priority,
            name: name.to_string(),
            options: None,
        }
    }

    /// Attach options given as inline YAML
    pub fn with_options(mut self, yaml: &str) -> Self {
        self.options = Some(serde_yaml::from_str(yaml).expect("invalid wrapper options YAML"));
        self
    }
}

/// Mount point configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    pub path: String,
    pub id: String,
    pub driver: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_options: Option<serde_yaml::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrappers: Option<Vec<WrapperConfig>>,
}

impl MountConfig {
    pub fn memory(path: &str, id: &str) -> Self {
        Self {
            path: path.to_string(),
            id: id.to_string(),
            driver: "memory".to_string(),
            driver_options: None,
            read_only: None,
            wrappers: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "debug".to_string(),
        }
    }
}

/// Full test configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestConfig {
    pub logging: LoggingConfig,
    pub mounts: Vec<MountConfig>,
}

impl TestConfig {
    /// Create a new configuration builder
    pub fn builder() -> TestConfigBuilder {
        TestConfigBuilder::new()
    }

    /// Serialize to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write configuration to a file
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let yaml = self.to_yaml()?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}

/// Builder for test configurations
pub struct TestConfigBuilder {
    config: TestConfig,
    default_wrappers: Option<Vec<WrapperConfig>>,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: TestConfig::default(),
            default_wrappers: None,
        }
    }

    /// Set the logging level
    pub fn logging_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    /// Wrapper chain applied to mounts that declare none
    pub fn default_wrappers(mut self, wrappers: Vec<WrapperConfig>) -> Self {
        self.default_wrappers = Some(wrappers);
        self
    }

    /// Add a mount with full configuration
    pub fn add_mount(mut self, mount: MountConfig) -> Self {
        self.config.mounts.push(mount);
        self
    }

    /// Add a writable in-memory mount
    pub fn add_memory_mount(self, path: &str, id: &str) -> Self {
        self.add_mount(MountConfig::memory(path, id))
    }

    /// Add a read-only in-memory mount
    pub fn add_read_only_mount(self, path: &str, id: &str) -> Self {
        self.add_mount(MountConfig {
            read_only: Some(true),
            ..MountConfig::memory(path, id)
        })
    }

    /// Add an in-memory mount with an explicit wrapper chain
    pub fn add_mount_with_wrappers(
        self,
        path: &str,
        id: &str,
        wrappers: Vec<WrapperConfig>,
    ) -> Self {
        self.add_mount(MountConfig {
            wrappers: Some(wrappers),
            ..MountConfig::memory(path, id)
        })
    }

    /// Build the final configuration
    pub fn build(mut self) -> TestConfig {
        // Apply defaults to all mounts that don't have explicit values
        for mount in &mut self.config.mounts {
            if mount.wrappers.is_none() {
                mount.wrappers = self.default_wrappers.clone();
            }
        }
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Root plus `/home` mount, the layout most tests start from
pub fn standard_test_config() -> TestConfig {
    TestConfigBuilder::new()
        .add_memory_mount("/", "root")
        .add_memory_mount("/home", "home")
        .build()
}
