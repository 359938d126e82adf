//! Configuration management
//!
//! This module handles loading, validation, and management of the Trawl engine
//! configuration. Configuration is stored in TOML format at ~/.trawl/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **host**: Host version, target runtime environment, runtime-provided package prefixes
//! - **feeds**: Package feed URLs, tried in order
//! - **resolver**: Hard recursion ceiling for dependency resolution
//! - **inspector**: Reclamation polling for plugin inspection
//!
//! The security policy lives in its own file, see [`security`].
//!
//! # Examples
//!
//! ```no_run
//! use trawl_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Data dir: {:?}", config.core.data_dir);
//! println!("Feeds: {:?}", config.feeds.sources);
//! # Ok(())
//! # }
//! ```

pub mod security;

pub use security::SecuritySettings;

use crate::package::{parse_version, TargetEnvironment};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// Host description used for resolution and inspection
    #[serde(default)]
    pub host: HostConfig,

    /// Package feeds
    #[serde(default)]
    pub feeds: FeedsConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub inspector: InspectorConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Host version compared against a plugin's minimum host version
    #[serde(default = "default_host_version")]
    pub version: String,

    /// Runtime environment plugin binaries must target
    #[serde(default = "default_target_environment")]
    pub target_environment: String,

    /// Package id prefixes that ship with the host runtime and are never
    /// installed as plugin dependencies
    #[serde(default = "default_runtime_prefixes")]
    pub runtime_prefixes: Vec<String>,

    /// Explicit host module manifest (defaults to modules.toml next to the executable)
    #[serde(default)]
    pub module_manifest: Option<PathBuf>,
}

/// Feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedsConfig {
    /// Feed base URLs, tried in order
    #[serde(default = "default_feed_sources")]
    pub sources: Vec<String>,

    /// Per-request timeout (seconds)
    #[serde(default = "default_feed_timeout")]
    pub timeout_secs: u64,
}

/// Resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Hard recursion ceiling, independent of the security policy's depth limit
    #[serde(default = "default_max_resolution_depth")]
    pub max_depth: usize,
}

/// Inspector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectorConfig {
    /// Number of times reclamation of an inspected binary is checked
    #[serde(default = "default_reclaim_attempts")]
    pub reclaim_attempts: u32,

    /// Delay between reclamation checks (milliseconds)
    #[serde(default = "default_reclaim_interval_ms")]
    pub reclaim_interval_ms: u64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.trawl")
}

fn default_host_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_target_environment() -> String {
    TargetEnvironment::host().to_string()
}

fn default_runtime_prefixes() -> Vec<String> {
    vec!["trawl.runtime.".to_string(), "trawl-sdk".to_string()]
}

fn default_feed_sources() -> Vec<String> {
    vec!["https://plugins.trawl.dev/v1".to_string()]
}

fn default_feed_timeout() -> u64 {
    30
}

fn default_max_resolution_depth() -> usize {
    50
}

fn default_reclaim_attempts() -> u32 {
    10
}

fn default_reclaim_interval_ms() -> u64 {
    50
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            version: default_host_version(),
            target_environment: default_target_environment(),
            runtime_prefixes: default_runtime_prefixes(),
            module_manifest: None,
        }
    }
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            sources: default_feed_sources(),
            timeout_secs: default_feed_timeout(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_resolution_depth(),
        }
    }
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            reclaim_attempts: default_reclaim_attempts(),
            reclaim_interval_ms: default_reclaim_interval_ms(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.trawl/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    pub fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default_config();

        // Save before processing so ~ stays unexpanded on disk
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = config;
        config.validate_and_process()?;
        Ok(config)
    }

    /// Configuration rooted at `data_dir`, not read from or written to disk
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let mut config = Self::default_config();
        config.core.data_dir = data_dir.into();
        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.trawl/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".trawl").join("config.toml"))
    }

    fn default_config() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
                data_dir: default_data_dir(),
            },
            host: HostConfig::default(),
            feeds: FeedsConfig::default(),
            resolver: ResolverConfig::default(),
            inspector: InspectorConfig::default(),
        }
    }

    /// Validate values, expand `~` and create the data directory
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        parse_version(&self.host.version)
            .map_err(|e| EngineError::Config(format!("Invalid host version: {}", e)))?;
        self.target_environment()?;

        for source in &self.feeds.sources {
            if !(source.starts_with("http://") || source.starts_with("https://")) {
                return Err(EngineError::Config(format!(
                    "Feed '{}' must be an http(s) URL",
                    source
                )));
            }
        }

        if self.resolver.max_depth == 0 {
            return Err(EngineError::Config("resolver.max_depth must be at least 1".to_string()));
        }

        if self.inspector.reclaim_attempts == 0 {
            return Err(EngineError::Config(
                "inspector.reclaim_attempts must be at least 1".to_string(),
            ));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if let Some(manifest) = &self.host.module_manifest {
            self.host.module_manifest = Some(expand_path(manifest)?);
        }

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }

    pub fn target_environment(&self) -> Result<TargetEnvironment, EngineError> {
        TargetEnvironment::parse(&self.host.target_environment)
    }

    pub fn host_version(&self) -> Result<semver::Version, EngineError> {
        parse_version(&self.host.version)
    }

    /// ~/.trawl/security.toml
    pub fn security_path(&self) -> PathBuf {
        self.core.data_dir.join("security.toml")
    }

    /// ~/.trawl/installed.json
    pub fn installed_path(&self) -> PathBuf {
        self.core.data_dir.join("installed.json")
    }

    /// Per-plugin install roots
    pub fn plugins_dir(&self) -> PathBuf {
        self.core.data_dir.join("plugins")
    }

    /// Shared dependency extractions
    pub fn packages_dir(&self) -> PathBuf {
        self.core.data_dir.join("packages")
    }

    /// Temporary download areas
    pub fn tmp_dir(&self) -> PathBuf {
        self.core.data_dir.join("tmp")
    }
}

/// Expand ~ in path to user's home directory
pub(crate) fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default_config();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.resolver.max_depth, 50);
        assert_eq!(config.inspector.reclaim_attempts, 10);
        assert_eq!(config.inspector.reclaim_interval_ms, 50);
        assert_eq!(config.host.target_environment, "trawl0.1");
        assert!(!config.feeds.sources.is_empty());
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default_config();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(config.feeds.sources, deserialized.feeds.sources);
        assert_eq!(config.host.runtime_prefixes, deserialized.host.runtime_prefixes);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str("[core]\n").unwrap();
        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.resolver.max_depth, 50);
    }
}
