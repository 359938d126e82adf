//! Security policy settings
//!
//! Stored at ~/.trawl/security.toml and created with defaults on first run.
//! The file carries a `schema_version`; files written by a newer engine are
//! rejected rather than silently misread.

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Current security settings schema
pub const SECURITY_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecuritySettings {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Package id patterns allowed to be installed; empty allows everything
    #[serde(default)]
    pub allowlist: Vec<String>,

    /// Package id patterns never installed; wins over the allowlist
    #[serde(default)]
    pub blocklist: Vec<String>,

    #[serde(default = "default_max_dependency_depth")]
    pub max_dependency_depth: usize,

    #[serde(default = "default_max_package_size")]
    pub max_package_size_bytes: u64,

    #[serde(default = "default_max_total_download_size")]
    pub max_total_download_size_bytes: u64,

    /// Feed URLs considered trusted
    #[serde(default)]
    pub trusted_feeds: Vec<String>,

    #[serde(default = "default_true")]
    pub allow_untrusted_feeds: bool,
}

fn default_schema_version() -> u32 {
    SECURITY_SCHEMA_VERSION
}

fn default_max_dependency_depth() -> usize {
    10
}

fn default_max_package_size() -> u64 {
    100 * 1024 * 1024
}

fn default_max_total_download_size() -> u64 {
    500 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            schema_version: SECURITY_SCHEMA_VERSION,
            allowlist: Vec::new(),
            blocklist: Vec::new(),
            max_dependency_depth: default_max_dependency_depth(),
            max_package_size_bytes: default_max_package_size(),
            max_total_download_size_bytes: default_max_total_download_size(),
            trusted_feeds: Vec::new(),
            allow_untrusted_feeds: true,
        }
    }
}

impl SecuritySettings {
    /// Load settings from `path`, writing the defaults there first if missing
    pub fn load_or_create(path: &Path) -> Result<Self, EngineError> {
        if path.exists() {
            return Self::load_from_path(path);
        }

        let settings = Self::default();
        settings.save(path)?;
        info!("Created default security settings at {}", path.display());
        Ok(settings)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("Failed to read security settings: {}", e))
        })?;

        let settings: SecuritySettings = toml::from_str(&contents).map_err(|e| {
            EngineError::Config(format!("Failed to parse security settings: {}", e))
        })?;

        if settings.schema_version > SECURITY_SCHEMA_VERSION {
            return Err(EngineError::Config(format!(
                "Security settings schema {} is newer than supported ({})",
                settings.schema_version, SECURITY_SCHEMA_VERSION
            )));
        }

        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            EngineError::Config(format!("Failed to serialize security settings: {}", e))
        })?;

        fs::write(path, toml_string).map_err(|e| {
            EngineError::Config(format!("Failed to write security settings: {}", e))
        })
    }
}
