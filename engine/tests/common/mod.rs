//! Shared fixtures for engine integration tests
//!
//! `MockFeed` serves metadata and zip artifacts from memory and records
//! every download; `FakeInspector` stands in for native library loading.

#![allow(dead_code)]

use async_trait::async_trait;
use sdk::errors::EngineError;
use semver::Version;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use trawl_engine::cache::{DependencyCache, HostModuleInfo, HostModuleSource};
use trawl_engine::config::{Config, SecuritySettings};
use trawl_engine::feed::{artifact_file_name, FeedClient, FeedSet};
use trawl_engine::inspector::{BinaryInspector, ValidationResult, ValidationStatus};
use trawl_engine::installer::PackageInstaller;
use trawl_engine::package::{
    parse_version, DependencyGroup, PackageDependency, PackageIdentity, PackageMetadata,
    TargetEnvironment, VersionRange,
};
use trawl_engine::platform;

pub const FEED_URL: &str = "https://feed.test/v1";

pub fn v(s: &str) -> Version {
    parse_version(s).unwrap()
}

pub fn env(s: &str) -> TargetEnvironment {
    TargetEnvironment::parse(s).unwrap()
}

/// Metadata with one dependency group per `(environment, deps)` entry
pub fn meta_for(id: &str, version: &str, groups: &[(&str, &[(&str, &str)])]) -> PackageMetadata {
    PackageMetadata {
        id: id.to_string(),
        version: v(version),
        description: None,
        download_url: None,
        size_bytes: 1024,
        sha256: None,
        dependency_groups: groups
            .iter()
            .map(|(environment, deps)| DependencyGroup {
                target_environment: env(environment),
                dependencies: deps
                    .iter()
                    .map(|(dep_id, range)| PackageDependency {
                        id: dep_id.to_string(),
                        range: VersionRange::parse(range).unwrap(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

/// Metadata whose dependencies apply to every environment
pub fn meta(id: &str, version: &str, deps: &[(&str, &str)]) -> PackageMetadata {
    meta_for(id, version, &[("any", deps)])
}

/// Zip archive built in memory
pub fn zip_bytes(files: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, contents) in files {
            zip.start_file(name.as_str(), options).unwrap();
            zip.write_all(contents).unwrap();
        }
        zip.finish().unwrap();
    }
    cursor.into_inner()
}

/// Archive holding one shared library named after `stem` under `lib/<environment>/`
pub fn library_archive(environment: &str, stem: &str) -> Vec<u8> {
    zip_bytes(&[(
        format!("lib/{}/{}", environment, platform::library_filename(stem)),
        format!("binary of {}", stem).into_bytes(),
    )])
}

#[derive(Default)]
struct FeedState {
    packages: HashMap<String, Vec<PackageMetadata>>,
    artifacts: HashMap<String, Vec<u8>>,
    downloads: Vec<String>,
    searches: usize,
    offline: bool,
}

/// In-memory feed
pub struct MockFeed {
    url: String,
    state: Mutex<FeedState>,
}

impl MockFeed {
    pub fn new() -> Arc<Self> {
        Self::with_url(FEED_URL)
    }

    pub fn with_url(url: &str) -> Arc<Self> {
        Arc::new(Self {
            url: url.to_string(),
            state: Mutex::new(FeedState::default()),
        })
    }

    /// Publish metadata without an artifact
    pub fn publish(&self, metadata: PackageMetadata) {
        let mut state = self.state.lock().unwrap();
        state
            .packages
            .entry(metadata.id.to_lowercase())
            .or_default()
            .push(metadata);
    }

    /// Publish metadata together with its zip artifact
    pub fn publish_with(&self, mut metadata: PackageMetadata, archive: Vec<u8>) {
        metadata.size_bytes = archive.len() as u64;
        let key = metadata.identity().key();
        self.state.lock().unwrap().artifacts.insert(key, archive);
        self.publish(metadata);
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    /// Cache keys of every artifact downloaded so far
    pub fn downloads(&self) -> Vec<String> {
        self.state.lock().unwrap().downloads.clone()
    }

    pub fn download_count(&self, id: &str) -> usize {
        let prefix = format!("{}:", id.to_lowercase());
        self.downloads()
            .iter()
            .filter(|key| key.starts_with(&prefix))
            .count()
    }

    pub fn search_count(&self) -> usize {
        self.state.lock().unwrap().searches
    }
}

pub fn feed_set(feed: &Arc<MockFeed>) -> FeedSet {
    FeedSet::new(vec![Arc::clone(feed) as Arc<dyn FeedClient>])
}

#[async_trait]
impl FeedClient for MockFeed {
    fn feed_url(&self) -> &str {
        &self.url
    }

    async fn search_metadata(&self, package_id: &str) -> Result<Vec<PackageMetadata>, EngineError> {
        let mut state = self.state.lock().unwrap();
        if state.offline {
            return Err(EngineError::Network("feed offline".to_string()));
        }
        state.searches += 1;
        Ok(state
            .packages
            .get(&package_id.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    async fn download_artifact(
        &self,
        identity: &PackageIdentity,
        dest_dir: &Path,
    ) -> Result<PathBuf, EngineError> {
        let bytes = {
            let mut state = self.state.lock().unwrap();
            if state.offline {
                return Err(EngineError::Network("feed offline".to_string()));
            }
            let bytes = state
                .artifacts
                .get(&identity.key())
                .cloned()
                .ok_or_else(|| EngineError::PackageNotFound(identity.to_string()))?;
            state.downloads.push(identity.key());
            bytes
        };

        let path = dest_dir.join(artifact_file_name(identity));
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

/// Host module snapshot fixed at construction
pub struct FixedModules(pub Vec<HostModuleInfo>);

impl HostModuleSource for FixedModules {
    fn snapshot(&self) -> Vec<HostModuleInfo> {
        self.0.clone()
    }
}

pub fn empty_cache() -> Arc<DependencyCache> {
    Arc::new(DependencyCache::with_source(FixedModules(Vec::new())))
}

/// Accepts every candidate as a plugin called `plugin_id`
pub struct FakeInspector {
    status: ValidationStatus,
    plugin_id: String,
    inspected: Mutex<Vec<PathBuf>>,
}

impl FakeInspector {
    pub fn valid(plugin_id: &str) -> Arc<Self> {
        Self::with_status(plugin_id, ValidationStatus::Valid)
    }

    pub fn with_status(plugin_id: &str, status: ValidationStatus) -> Arc<Self> {
        Arc::new(Self {
            status,
            plugin_id: plugin_id.to_string(),
            inspected: Mutex::new(Vec::new()),
        })
    }

    pub fn inspected(&self) -> Vec<PathBuf> {
        self.inspected.lock().unwrap().clone()
    }
}

#[async_trait]
impl BinaryInspector for FakeInspector {
    async fn inspect(&self, path: &Path) -> ValidationResult {
        self.inspected.lock().unwrap().push(path.to_path_buf());

        let mut result = ValidationResult::new(self.status, format!("inspected {}", path.display()));
        if self.status == ValidationStatus::Valid {
            result.plugin_id = Some(self.plugin_id.clone());
            result.plugin_name = Some(format!("{} plugin", self.plugin_id));
            result.plugin_version = Some("1.0.0".to_string());
        }
        result
    }
}

/// Installer over `feed` rooted in `data_dir`
pub fn installer(
    data_dir: &Path,
    feed: &Arc<MockFeed>,
    inspector: Arc<FakeInspector>,
    security: SecuritySettings,
) -> PackageInstaller {
    let mut config = Config::with_data_dir(data_dir).unwrap();
    config.host.target_environment = "trawl0.1".to_string();

    PackageInstaller::new(&config, feed_set(feed), empty_cache(), security)
        .unwrap()
        .with_inspector(inspector)
}
