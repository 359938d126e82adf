//! Plugin inspection
//!
//! Validates that a candidate binary implements the plugin contract before it
//! is trusted. The binary is loaded into an [`IsolatedScope`], examined, and
//! the scope is torn down on every path, including panics raised by plugin
//! code. Afterwards the inspector polls until the module is confirmed gone.
//!
//! Inspection steps:
//!
//! 1. Read the export table; a binary without one exports no plugin types
//! 2. Keep concrete types; none → `NoPlugin`
//! 3. First candidate without a declaration → `NoPlugin`
//! 4. Instantiate; failure or panic → `InvalidPackage`
//! 5. Host older than the declared minimum → `IncompatibleSdk`
//! 6. Otherwise `Valid`, reporting the instance's id, name and version

mod scope;

pub use scope::{confirm_reclaimed, IsolatedScope};

use crate::config::Config;
use crate::package::parse_version;
use crate::resolver::DependencyInfo;
use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::plugin::{PluginExports, PLUGIN_ABI_VERSION};
use semver::Version;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Valid,
    NoPlugin,
    IncompatibleSdk,
    InvalidPackage,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Valid => "valid",
            Self::NoPlugin => "no plugin",
            Self::IncompatibleSdk => "incompatible SDK",
            Self::InvalidPackage => "invalid package",
        };
        f.write_str(text)
    }
}

/// Verdict on a candidate binary
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub plugin_id: Option<String>,
    pub plugin_name: Option<String>,
    pub plugin_version: Option<String>,
    /// Declared minimum host version, set for `IncompatibleSdk`
    pub min_required_sdk_version: Option<String>,
    pub message: String,
    pub dependencies: Vec<DependencyInfo>,
    pub total_download_size: u64,
    pub security_warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new(status: ValidationStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            plugin_id: None,
            plugin_name: None,
            plugin_version: None,
            min_required_sdk_version: None,
            message: message.into(),
            dependencies: Vec::new(),
            total_download_size: 0,
            security_warnings: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == ValidationStatus::Valid
    }
}

#[derive(Debug, Clone)]
pub struct InspectorOptions {
    /// Version of the running host
    pub host_version: Version,
    pub reclaim_attempts: u32,
    pub reclaim_interval: Duration,
}

impl Default for InspectorOptions {
    fn default() -> Self {
        Self {
            host_version: parse_version(env!("CARGO_PKG_VERSION")).unwrap_or(Version::new(0, 1, 0)),
            reclaim_attempts: 10,
            reclaim_interval: Duration::from_millis(50),
        }
    }
}

impl InspectorOptions {
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        Ok(Self {
            host_version: config.host_version()?,
            reclaim_attempts: config.inspector.reclaim_attempts,
            reclaim_interval: Duration::from_millis(config.inspector.reclaim_interval_ms),
        })
    }
}

/// Validates candidate plugin binaries
#[async_trait]
pub trait BinaryInspector: Send + Sync {
    async fn inspect(&self, path: &Path) -> ValidationResult;
}

#[derive(Debug, Clone, Default)]
pub struct PluginInspector {
    options: InspectorOptions,
}

impl PluginInspector {
    pub fn new(options: InspectorOptions) -> Self {
        Self { options }
    }

    /// Inspect `path` synchronously; loads and unloads native code
    pub fn inspect_blocking(&self, path: &Path) -> ValidationResult {
        info!("Inspecting {}", path.display());

        let scope = match IsolatedScope::load(path) {
            Ok(scope) => scope,
            Err(e) => {
                return ValidationResult::new(
                    ValidationStatus::InvalidPackage,
                    format!("Binary could not be loaded: {}", e),
                )
            }
        };

        let result = match scope.exports() {
            Ok(exports) => {
                match catch_unwind(AssertUnwindSafe(|| self.examine(exports))) {
                    Ok(result) => result,
                    Err(_) => ValidationResult::new(
                        ValidationStatus::InvalidPackage,
                        "Plugin code panicked during inspection",
                    ),
                }
            }
            Err(EngineError::SymbolNotFound(_)) => ValidationResult::new(
                ValidationStatus::NoPlugin,
                "Binary exports no plugin types",
            ),
            Err(e) => ValidationResult::new(ValidationStatus::InvalidPackage, e.to_string()),
        };

        let liveness = scope.unload();
        confirm_reclaimed(
            &liveness,
            path,
            self.options.reclaim_attempts,
            self.options.reclaim_interval,
        );

        info!("Inspection of {}: {}", path.display(), result.status);
        result
    }

    /// Walk the export table; runs entirely inside the scope
    fn examine(&self, exports: &PluginExports) -> ValidationResult {
        if exports.abi_version != PLUGIN_ABI_VERSION {
            return ValidationResult::new(
                ValidationStatus::InvalidPackage,
                format!(
                    "Plugin ABI version {} is not supported (expected {})",
                    exports.abi_version, PLUGIN_ABI_VERSION
                ),
            );
        }

        let exported = exports.exported_types();
        let Some(candidate) = exported.iter().find(|t| t.is_concrete()) else {
            return ValidationResult::new(ValidationStatus::NoPlugin, "No concrete plugin type found");
        };

        let (Some(declaration), Some(factory)) = (candidate.declaration, candidate.factory) else {
            return ValidationResult::new(
                ValidationStatus::NoPlugin,
                format!("{} carries no plugin declaration", candidate.type_name),
            );
        };

        let plugin = match catch_unwind(factory) {
            Ok(Ok(plugin)) => plugin,
            Ok(Err(e)) => {
                return ValidationResult::new(
                    ValidationStatus::InvalidPackage,
                    format!("{} could not be created: {}", candidate.type_name, e),
                )
            }
            Err(_) => {
                return ValidationResult::new(
                    ValidationStatus::InvalidPackage,
                    format!("{} panicked while being created", candidate.type_name),
                )
            }
        };

        let min_host = match parse_version(declaration.min_host_version) {
            Ok(version) => version,
            Err(_) => {
                return ValidationResult::new(
                    ValidationStatus::InvalidPackage,
                    format!(
                        "Declared minimum host version '{}' is invalid",
                        declaration.min_host_version
                    ),
                )
            }
        };

        if self.options.host_version < min_host {
            let mut result = ValidationResult::new(
                ValidationStatus::IncompatibleSdk,
                format!(
                    "Plugin requires host {} or newer (running {})",
                    min_host, self.options.host_version
                ),
            );
            result.min_required_sdk_version = Some(declaration.min_host_version.to_string());
            result.plugin_id = Some(declaration.id.to_string());
            return result;
        }

        let mut result = ValidationResult::new(
            ValidationStatus::Valid,
            format!("Plugin built with SDK {}", exports.sdk_version),
        );
        result.plugin_id = Some(plugin.id().to_string());
        result.plugin_name = Some(plugin.name().to_string());
        result.plugin_version = Some(plugin.version().to_string());
        drop(plugin);
        result
    }
}

#[async_trait]
impl BinaryInspector for PluginInspector {
    async fn inspect(&self, path: &Path) -> ValidationResult {
        let inspector = self.clone();
        let path: PathBuf = path.to_path_buf();

        match tokio::task::spawn_blocking(move || inspector.inspect_blocking(&path)).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Inspection task failed: {}", e);
                ValidationResult::new(ValidationStatus::InvalidPackage, format!("Inspection aborted: {}", e))
            }
        }
    }
}
