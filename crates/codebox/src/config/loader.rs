//! Configuration file loading for Codebox
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, File, FileFormat};

use crate::config::{Config, ConfigError};

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::read_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Deserialize a YAML file without validating it
    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from(path).format(FileFormat::Yaml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Parse configuration from a YAML string
    pub fn parse_yaml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Yaml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file at `path` if it exists (built-in defaults otherwise),
    /// then apply environment overrides. Validation runs once, on the merged
    /// result.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_with(path.as_ref(), |var| std::env::var(var).ok())
    }

    pub(crate) fn load_with<F>(path: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = if path.exists() {
            Self::read_file(path)?
        } else {
            Self::default()
        };
        config.apply_env_from(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.max_requests == 0 {
            return Err(ConfigError::Invalid(
                "max_requests must be at least 1".to_string(),
            ));
        }
        if self.worker_timeout == 0 {
            return Err(ConfigError::Invalid(
                "worker_timeout must be at least 1 second".to_string(),
            ));
        }
        if self.python_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("python_path is empty".to_string()));
        }
        if self.nodejs_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("nodejs_path is empty".to_string()));
        }
        if self.python_root.as_os_str().is_empty() || self.nodejs_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "sandbox root paths must not be empty".to_string(),
            ));
        }
        self.deps_update_interval()?;

        Ok(())
    }
}
