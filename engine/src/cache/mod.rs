//! Dependency cache
//!
//! Process-wide registry of extracted dependency packages, keyed by
//! `"{id_lower}:{version}"`, plus a memoized snapshot of the modules the host
//! process already provides.
//!
//! The cache is constructed once at startup and shared through `Arc`. Reads
//! happen outside the install gate (listing, inspection), so the map is a
//! `DashMap`.

mod host;

pub use host::{HostModuleInfo, HostModuleSource, ProcessModules};

use crate::package::PackageIdentity;
use dashmap::DashMap;
use semver::Version;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// A registered extraction, as reported by [`DependencyCache::entries`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub path: PathBuf,
}

pub struct DependencyCache {
    entries: DashMap<String, PathBuf>,
    host_modules: OnceLock<Vec<HostModuleInfo>>,
    source: Box<dyn HostModuleSource>,
}

impl DependencyCache {
    /// Cache backed by the running process's module set
    pub fn new() -> Self {
        Self::with_source(ProcessModules::default())
    }

    pub fn with_source(source: impl HostModuleSource + 'static) -> Self {
        Self {
            entries: DashMap::new(),
            host_modules: OnceLock::new(),
            source: Box::new(source),
        }
    }

    /// Path registered for `(id, version)`, if it still exists on disk
    ///
    /// A registered path that has disappeared is dropped from the cache.
    pub fn get_existing_path(&self, package_id: &str, version: &Version) -> Option<PathBuf> {
        let key = PackageIdentity::key_for(package_id, version);
        let path = self.entries.get(&key).map(|entry| entry.value().clone())?;

        if path.exists() {
            return Some(path);
        }

        debug!("Cache entry {} is stale ({}), removing", key, path.display());
        self.entries.remove_if(&key, |_, current| current == &path);
        None
    }

    /// Record where `(id, version)` was extracted; last writer wins
    pub fn register(&self, package_id: &str, version: &Version, path: impl AsRef<Path>) {
        let key = PackageIdentity::key_for(package_id, version);
        debug!("Cache register {} -> {}", key, path.as_ref().display());
        self.entries.insert(key, path.as_ref().to_path_buf());
    }

    /// Whether the host already provides `name`, at `min_version` or newer when given
    pub fn is_loaded_in_host(&self, name: &str, min_version: Option<&Version>) -> bool {
        self.host_modules().iter().any(|module| {
            module.matches_name(name)
                && match min_version {
                    None => true,
                    Some(min) => module.version.as_ref().is_some_and(|v| v >= min),
                }
        })
    }

    /// Modules resident in the host, computed on first use
    pub fn host_modules(&self) -> &[HostModuleInfo] {
        self.host_modules.get_or_init(|| {
            let modules = self.source.snapshot();
            debug!("Host module snapshot: {} module(s)", modules.len());
            modules
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all registrations, sorted by key
    pub fn entries(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self
            .entries
            .iter()
            .map(|e| CacheEntry {
                key: e.key().clone(),
                path: e.value().clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }
}

impl Default for DependencyCache {
    fn default() -> Self {
        Self::new()
    }
}
