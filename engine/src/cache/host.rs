//! Host module snapshot
//!
//! Anything the host process already provides must not be downloaded again.
//! The default [`ProcessModules`] source reports:
//! - the SDK the host was built with
//! - modules listed in the host's `modules.toml` manifest
//! - shared libraries shipped next to the executable
//! - on Linux, shared libraries currently mapped into the process
//!
//! Only the manifest and libraries beside the executable carry versions.
//! System libraries mapped from elsewhere are listed without one, so they never
//! satisfy a versioned dependency.

use crate::package::parse_version;
use crate::platform;
use semver::Version;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A module resident in the host process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostModuleInfo {
    pub name: String,
    /// `None` when the module carries no version information
    pub version: Option<Version>,
    pub location: Option<PathBuf>,
}

impl HostModuleInfo {
    pub fn new(name: impl Into<String>, version: Option<Version>, location: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            version,
            location,
        }
    }

    /// Names match case-insensitively, treating `-`, `_` and `.` alike
    pub fn matches_name(&self, name: &str) -> bool {
        platform::normalize_library_name(&self.name) == platform::normalize_library_name(name)
    }
}

/// Produces the host module snapshot
pub trait HostModuleSource: Send + Sync {
    fn snapshot(&self) -> Vec<HostModuleInfo>;
}

#[derive(Debug, Deserialize)]
struct ModuleManifest {
    #[serde(default, rename = "module")]
    modules: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    name: String,
    version: String,
}

/// Snapshot of the running process
#[derive(Debug, Clone)]
pub struct ProcessModules {
    manifest: Option<PathBuf>,
    scan_exe_dir: bool,
    scan_mapped: bool,
}

impl Default for ProcessModules {
    fn default() -> Self {
        Self {
            manifest: None,
            scan_exe_dir: true,
            scan_mapped: true,
        }
    }
}

impl ProcessModules {
    /// Only the SDK; no file system or process inspection
    pub fn empty() -> Self {
        Self {
            manifest: None,
            scan_exe_dir: false,
            scan_mapped: false,
        }
    }

    /// Use an explicit `modules.toml` instead of the one next to the executable
    pub fn with_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest = Some(path.into());
        self
    }

    fn exe_dir() -> Option<PathBuf> {
        std::env::current_exe().ok()?.parent().map(Path::to_path_buf)
    }

    fn manifest_modules(&self) -> Vec<HostModuleInfo> {
        let path = match &self.manifest {
            Some(path) => path.clone(),
            None => match Self::exe_dir() {
                Some(dir) if self.scan_exe_dir => dir.join("modules.toml"),
                _ => return Vec::new(),
            },
        };
        if !path.exists() {
            return Vec::new();
        }

        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|contents| toml::from_str::<ModuleManifest>(&contents).map_err(|e| e.to_string()));

        match parsed {
            Ok(manifest) => manifest
                .modules
                .into_iter()
                .filter_map(|entry| match parse_version(&entry.version) {
                    Ok(version) => Some(HostModuleInfo::new(entry.name, Some(version), Some(path.clone()))),
                    Err(e) => {
                        warn!("Ignoring host module {}: {}", entry.name, e);
                        None
                    }
                })
                .collect(),
            Err(e) => {
                warn!("Failed to read host module manifest {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }

    fn exe_dir_modules(&self) -> Vec<HostModuleInfo> {
        let Some(dir) = Self::exe_dir().filter(|_| self.scan_exe_dir) else {
            return Vec::new();
        };
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };

        entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| platform::is_shared_library(path))
            .filter_map(|path| {
                let name = platform::library_stem(&path)?;
                Some(HostModuleInfo::new(name, None, Some(path)))
            })
            .collect()
    }

    #[cfg(target_os = "linux")]
    fn mapped_modules(&self) -> Vec<HostModuleInfo> {
        if !self.scan_mapped {
            return Vec::new();
        }
        let Ok(maps) = std::fs::read_to_string("/proc/self/maps") else {
            return Vec::new();
        };
        parse_proc_maps(&maps, Self::exe_dir().as_deref())
    }

    #[cfg(not(target_os = "linux"))]
    fn mapped_modules(&self) -> Vec<HostModuleInfo> {
        Vec::new()
    }
}

impl HostModuleSource for ProcessModules {
    fn snapshot(&self) -> Vec<HostModuleInfo> {
        let mut modules = vec![HostModuleInfo::new(
            "trawl-sdk",
            parse_version(sdk::SDK_VERSION).ok(),
            None,
        )];

        for module in self
            .manifest_modules()
            .into_iter()
            .chain(self.exe_dir_modules())
            .chain(self.mapped_modules())
        {
            if !modules.iter().any(|m| m.matches_name(&module.name)) {
                modules.push(module);
            }
        }

        debug!("Collected {} host module(s)", modules.len());
        modules
    }
}

/// Shared objects listed in `/proc/<pid>/maps`, deduplicated by path
///
/// `libfoo.so.1.2.3` inside `host_dir` yields module `foo` at version `1.2.3`;
/// outside it the module is reported unversioned.
pub(crate) fn parse_proc_maps(maps: &str, host_dir: Option<&Path>) -> Vec<HostModuleInfo> {
    let mut modules: Vec<HostModuleInfo> = Vec::new();

    for line in maps.lines() {
        let Some(path) = line.split_whitespace().nth(5) else {
            continue;
        };
        if !path.starts_with('/') {
            continue;
        }
        let Some(file_name) = Path::new(path).file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((stem, suffix)) = file_name.split_once(".so") else {
            continue;
        };
        if !(suffix.is_empty() || suffix.starts_with('.')) {
            continue;
        }

        let name = stem.strip_prefix("lib").filter(|s| !s.is_empty()).unwrap_or(stem);
        let shipped_with_host = host_dir.is_some_and(|dir| Path::new(path).parent() == Some(dir));
        let version = suffix
            .strip_prefix('.')
            .filter(|_| shipped_with_host)
            .and_then(|v| parse_version(v).ok());

        if modules.iter().any(|m| m.location.as_deref() == Some(Path::new(path))) {
            continue;
        }
        modules.push(HostModuleInfo::new(name, version, Some(PathBuf::from(path))));
    }

    modules
}
