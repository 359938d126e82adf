//! Plugin package installer
//!
//! Orchestrates resolution, download, policy checks, extraction and
//! inspection. Every state-changing operation runs under one async mutex,
//! so at most one install, uninstall or update is in flight per installer.
//! The host constructs a single installer and shares it.
//!
//! Layout under the data directory:
//!
//! ```text
//! plugins/<id>/<version>/        root package, extracted
//!     lib/<env>/                 plugin binary plus copied dependency binaries
//! packages/<id>/<version>/       shared dependency extractions
//! tmp/install-XXXX/              downloads, removed when the operation ends
//! ```
//!
//! Failures never escape as errors: each operation reports a structured
//! [`InstallResult`] and per-dependency problems become warnings.

pub mod extract;
mod progress;

pub use progress::{progress_channel, InstallProgress};

use crate::cache::DependencyCache;
use crate::config::{Config, SecuritySettings};
use crate::feed::FeedSet;
use crate::inspector::{BinaryInspector, InspectorOptions, PluginInspector, ValidationResult, ValidationStatus};
use crate::package::{PackageIdentity, TargetEnvironment};
use crate::resolver::{DependencyInfo, DependencyResolver, ResolutionResult, ResolverOptions};
use crate::security::SecurityValidator;
use crate::store::{InstalledPluginRecord, PluginStore};
use chrono::Utc;
use progress::ProgressReporter;
use sdk::errors::{EngineError, TrawlErrorExt};
use semver::Version;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of an install, uninstall or update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallResult {
    pub success: bool,
    pub plugin_id: Option<String>,
    pub plugin_name: Option<String>,
    pub version: Option<String>,
    pub message: String,
    pub warnings: Vec<String>,
}

impl InstallResult {
    fn failed(error: &EngineError, warnings: Vec<String>) -> Self {
        Self {
            success: false,
            message: format!("{}. {}", error, error.user_hint()),
            warnings,
            ..Default::default()
        }
    }

    fn from_record(record: &InstalledPluginRecord, message: String, warnings: Vec<String>) -> Self {
        Self {
            success: true,
            plugin_id: Some(record.plugin_id.clone()),
            plugin_name: Some(record.plugin_name.clone()),
            version: Some(record.version.to_string()),
            message,
            warnings,
        }
    }
}

/// An installed plugin with a newer version on the feeds
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginUpdateInfo {
    pub plugin_id: String,
    pub plugin_name: String,
    pub package_id: String,
    pub current_version: String,
    pub latest_version: String,
}

/// Host hook asked to unload a plugin before its files are deleted
pub trait RunningPlugins: Send + Sync {
    fn unload(&self, plugin_id: &str);
}

/// Hook for hosts that never keep plugins loaded (the CLI)
#[derive(Debug, Default)]
pub struct NoRunningPlugins;

impl RunningPlugins for NoRunningPlugins {
    fn unload(&self, _plugin_id: &str) {}
}

/// Directories the installer writes to
#[derive(Debug, Clone)]
pub struct InstallerPaths {
    pub plugins_dir: PathBuf,
    pub packages_dir: PathBuf,
    pub tmp_dir: PathBuf,
}

impl InstallerPaths {
    pub fn from_config(config: &Config) -> Self {
        Self {
            plugins_dir: config.plugins_dir(),
            packages_dir: config.packages_dir(),
            tmp_dir: config.tmp_dir(),
        }
    }

    fn plugin_dir(&self, identity: &PackageIdentity) -> PathBuf {
        self.plugins_dir
            .join(identity.id_lower())
            .join(identity.version.to_string())
    }

    fn package_dir(&self, identity: &PackageIdentity) -> PathBuf {
        self.packages_dir
            .join(identity.id_lower())
            .join(identity.version.to_string())
    }
}

/// Artifacts fetched for one operation; the temp area goes away with it
struct Downloads {
    _area: TempDir,
    root: PathBuf,
    /// Cache key to downloaded archive
    dependencies: HashMap<String, PathBuf>,
    /// Cache keys of dependencies that could not be downloaded
    failed: HashSet<String>,
}

impl Downloads {
    fn archive_of(&self, identity: &PackageIdentity) -> Option<PathBuf> {
        self.dependencies.get(&identity.key()).cloned()
    }
}

/// Extracted root package ready for inspection
struct Staged {
    package_dir: PathBuf,
    library_dir: PathBuf,
}

pub struct PackageInstaller {
    resolver: DependencyResolver,
    feeds: FeedSet,
    cache: Arc<DependencyCache>,
    validator: SecurityValidator,
    inspector: Arc<dyn BinaryInspector>,
    store: PluginStore,
    paths: InstallerPaths,
    target: TargetEnvironment,
    running: Arc<dyn RunningPlugins>,
    gate: Mutex<()>,
}

impl PackageInstaller {
    pub fn new(
        config: &Config,
        feeds: FeedSet,
        cache: Arc<DependencyCache>,
        security: SecuritySettings,
    ) -> Result<Self, EngineError> {
        let resolver = DependencyResolver::new(
            feeds.clone(),
            Arc::clone(&cache),
            ResolverOptions::from_config(config),
        );
        let inspector = PluginInspector::new(InspectorOptions::from_config(config)?);

        Ok(Self {
            resolver,
            feeds,
            cache,
            validator: SecurityValidator::new(security),
            inspector: Arc::new(inspector),
            store: PluginStore::new(config.installed_path()),
            paths: InstallerPaths::from_config(config),
            target: config.target_environment()?,
            running: Arc::new(NoRunningPlugins),
            gate: Mutex::new(()),
        })
    }

    /// Replace the binary inspector
    pub fn with_inspector(mut self, inspector: Arc<dyn BinaryInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    /// Install the hook used to unload running plugins
    pub fn with_running_plugins(mut self, running: Arc<dyn RunningPlugins>) -> Self {
        self.running = running;
        self
    }

    pub fn cache(&self) -> &Arc<DependencyCache> {
        &self.cache
    }

    pub fn target_environment(&self) -> &TargetEnvironment {
        &self.target
    }

    /// Resolve without installing anything
    pub async fn resolve(
        &self,
        package_id: &str,
        version: &Version,
        cancel: &CancellationToken,
    ) -> ResolutionResult {
        self.resolver
            .resolve(package_id, version, &self.target, cancel)
            .await
    }

    /// Install `package_id` at `version` with its dependencies
    pub async fn install(
        &self,
        package_id: &str,
        version: &Version,
        progress: Option<watch::Sender<InstallProgress>>,
        cancel: &CancellationToken,
    ) -> InstallResult {
        let _guard = self.gate.lock().await;
        let mut reporter = ProgressReporter::new(progress);
        self.install_locked(package_id, version, &mut reporter, cancel)
            .await
    }

    async fn install_locked(
        &self,
        package_id: &str,
        version: &Version,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> InstallResult {
        info!("Installing {} {}", package_id, version);
        let mut warnings = Vec::new();

        match self
            .run_install(package_id, version, reporter, cancel, &mut warnings)
            .await
        {
            Ok(record) => {
                reporter.report(100, "Installed");
                info!("Installed {} {} as {}", package_id, version, record.plugin_id);
                let message = format!("Installed {} {}", record.plugin_name, record.version);
                InstallResult::from_record(&record, message, warnings)
            }
            Err(e) => {
                reporter.report(100, "Failed");
                warn!("Install of {} {} failed: {}", package_id, version, e);
                InstallResult::failed(&e, warnings)
            }
        }
    }

    async fn run_install(
        &self,
        package_id: &str,
        version: &Version,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
        warnings: &mut Vec<String>,
    ) -> Result<InstalledPluginRecord, EngineError> {
        let identity = PackageIdentity::new(package_id, version.clone());

        reporter.report(5, "Resolving dependencies");
        let resolution = self.resolve_checked(&identity, cancel, warnings).await?;

        let downloads = self
            .download_all(&identity, &resolution, reporter, cancel, warnings)
            .await?;

        check_cancelled(cancel)?;
        reporter.report(55, "Checking security policy");
        self.check_policy(&identity, &resolution, warnings)?;

        check_cancelled(cancel)?;
        reporter.report(60, "Extracting package");
        let install_dir = self.paths.plugin_dir(&identity);
        let staged = self.stage_root(&downloads.root, &install_dir).await?;

        self.place_dependencies(
            &staged.library_dir,
            &resolution.dependencies,
            &downloads,
            reporter,
            cancel,
            warnings,
        )
        .await?;

        reporter.report(88, "Inspecting plugin");
        let validation = self.inspect_staged(&staged, package_id).await;
        if !validation.is_valid() {
            discard_dir(&staged.package_dir);
            return Err(EngineError::Inspection(format!(
                "{}: {}",
                validation.status, validation.message
            )));
        }

        check_cancelled(cancel)?;
        reporter.report(95, "Saving plugin metadata");
        let plugin_id = validation
            .plugin_id
            .clone()
            .unwrap_or_else(|| package_id.to_string());
        self.replace_previous(&plugin_id, &staged.package_dir, warnings)
            .await?;

        let record = InstalledPluginRecord {
            plugin_id,
            plugin_name: validation.plugin_name.unwrap_or_else(|| package_id.to_string()),
            version: version.clone(),
            package_id: package_id.to_string(),
            install_path: staged.package_dir.clone(),
            dependencies: resolution.dependencies,
            install_date_utc: Utc::now(),
        };
        self.store.upsert(record.clone()).await?;
        self.cache.register(package_id, version, &staged.package_dir);

        Ok(record)
    }

    /// Remove the files of an earlier install of `plugin_id` living elsewhere
    ///
    /// The store keeps one record per plugin id, so once the new record is
    /// written nothing would point at the old folder any more.
    async fn replace_previous(
        &self,
        plugin_id: &str,
        new_dir: &Path,
        warnings: &mut Vec<String>,
    ) -> Result<(), EngineError> {
        let Some(previous) = self.store.find(plugin_id).await? else {
            return Ok(());
        };
        if previous.install_path == new_dir || !previous.install_path.exists() {
            return Ok(());
        }

        info!(
            "Replacing {} {} at {}",
            previous.plugin_id,
            previous.version,
            previous.install_path.display()
        );
        self.running.unload(&previous.plugin_id);
        if let Err(e) = tokio::fs::remove_dir_all(&previous.install_path).await {
            warn!("Could not delete {}: {}", previous.install_path.display(), e);
            warnings.push(format!(
                "Files of {} {} could not be fully removed: {}",
                previous.plugin_id, previous.version, e
            ));
        }
        if let Some(parent) = previous.install_path.parent() {
            extract::remove_if_empty(parent);
        }
        Ok(())
    }

    async fn resolve_checked(
        &self,
        identity: &PackageIdentity,
        cancel: &CancellationToken,
        warnings: &mut Vec<String>,
    ) -> Result<ResolutionResult, EngineError> {
        let mut resolution = self
            .resolver
            .resolve(&identity.id, &identity.version, &self.target, cancel)
            .await;
        warnings.append(&mut resolution.warnings);

        check_cancelled(cancel)?;
        if !resolution.success {
            return Err(EngineError::Resolution(
                resolution
                    .error_message
                    .unwrap_or_else(|| format!("{} could not be resolved", identity)),
            ));
        }
        Ok(resolution)
    }

    fn check_policy(
        &self,
        identity: &PackageIdentity,
        resolution: &ResolutionResult,
        warnings: &mut Vec<String>,
    ) -> Result<(), EngineError> {
        let mut verdict = self.validator.validate(
            &identity.id,
            &identity.version,
            &resolution.dependencies,
            resolution.source_feed.as_deref(),
        );
        warnings.append(&mut verdict.warnings);

        if verdict.is_blocked {
            return Err(EngineError::SecurityViolation(
                verdict
                    .block_reason
                    .unwrap_or_else(|| format!("{} is blocked", identity.id)),
            ));
        }
        if !verdict.is_valid {
            return Err(EngineError::SecurityViolation(verdict.errors.join("; ")));
        }
        Ok(())
    }

    /// Download the root and every dependency missing from the cache
    async fn download_all(
        &self,
        identity: &PackageIdentity,
        resolution: &ResolutionResult,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
        warnings: &mut Vec<String>,
    ) -> Result<Downloads, EngineError> {
        check_cancelled(cancel)?;
        std::fs::create_dir_all(&self.paths.tmp_dir)?;
        let area = tempfile::Builder::new()
            .prefix("install-")
            .tempdir_in(&self.paths.tmp_dir)?;

        reporter.report(15, format!("Downloading {}", identity));
        let root = self.feeds.download(identity, area.path()).await?;
        self.check_size(&root)?;

        let count = resolution.dependencies.len();
        let mut dependencies = HashMap::new();
        let mut failed = HashSet::new();

        for (i, dependency) in resolution.dependencies.iter().enumerate() {
            check_cancelled(cancel)?;
            let dep_identity = PackageIdentity::new(&dependency.package_id, dependency.version.clone());
            reporter.report(
                ProgressReporter::span(20, 50, i, count),
                format!("Downloading {}", dep_identity),
            );

            if self.cached_package(&dep_identity).is_some() {
                debug!("{} already extracted, skipping download", dep_identity);
                continue;
            }

            match self.feeds.download(&dep_identity, area.path()).await {
                Ok(path) => {
                    self.check_size(&path)?;
                    dependencies.insert(dep_identity.key(), path);
                }
                Err(e) => {
                    warn!("Skipping dependency {}: {}", dep_identity, e);
                    warnings.push(format!("Failed to download dependency {}: {}", dep_identity, e));
                    failed.insert(dep_identity.key());
                }
            }
        }

        Ok(Downloads {
            _area: area,
            root,
            dependencies,
            failed,
        })
    }

    fn check_size(&self, artifact: &Path) -> Result<(), EngineError> {
        if self.validator.validate_size(artifact) {
            return Ok(());
        }
        let size = std::fs::metadata(artifact).map(|m| m.len()).unwrap_or(0);
        Err(EngineError::PackageTooLarge {
            size,
            limit: self.validator.settings().max_package_size_bytes,
        })
    }

    /// Extraction directory of a dependency, from the cache or from a
    /// previous run's completed extraction
    fn cached_package(&self, identity: &PackageIdentity) -> Option<PathBuf> {
        if let Some(path) = self.cache.get_existing_path(&identity.id, &identity.version) {
            return Some(path);
        }

        let dir = self.paths.package_dir(identity);
        if extract::is_extracted(&dir) {
            debug!("Re-registering {} from {}", identity, dir.display());
            self.cache.register(&identity.id, &identity.version, &dir);
            return Some(dir);
        }
        None
    }

    async fn stage_root(&self, archive: &Path, install_dir: &Path) -> Result<Staged, EngineError> {
        let archive = archive.to_path_buf();
        let package_dir = install_dir.to_path_buf();
        let target = self.target.clone();

        run_blocking(move || {
            extract::extract_fresh(&archive, &package_dir)?;
            let library_dir = extract::select_library_dir(&package_dir, &target);
            Ok(Staged {
                package_dir,
                library_dir,
            })
        })
        .await
    }

    /// Copy dependency binaries next to the plugin binary
    ///
    /// Cached dependencies are copied from their shared extraction, fresh
    /// downloads are extracted into the package area and registered first.
    /// Dependencies whose download failed were already reported and are
    /// skipped.
    async fn place_dependencies(
        &self,
        library_dir: &Path,
        resolved: &[DependencyInfo],
        downloads: &Downloads,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
        warnings: &mut Vec<String>,
    ) -> Result<(), EngineError> {
        let count = resolved.len();

        for (i, dependency) in resolved.iter().enumerate() {
            check_cancelled(cancel)?;
            let dep_identity = PackageIdentity::new(&dependency.package_id, dependency.version.clone());
            if downloads.failed.contains(&dep_identity.key()) {
                continue;
            }
            reporter.report(
                ProgressReporter::span(65, 85, i, count),
                format!("Installing dependency {}", dep_identity),
            );

            let archive = downloads.archive_of(&dep_identity);
            if let Err(e) = self.place_dependency(&dep_identity, archive, library_dir).await {
                warn!("Dependency {} not installed: {}", dep_identity, e);
                warnings.push(format!("Failed to install dependency {}: {}", dep_identity, e));
            }
        }

        Ok(())
    }

    async fn place_dependency(
        &self,
        identity: &PackageIdentity,
        archive: Option<PathBuf>,
        library_dir: &Path,
    ) -> Result<(), EngineError> {
        let source_dir = match (self.cached_package(identity), archive) {
            (Some(dir), _) => dir,
            (None, Some(archive)) => {
                let dest = self.paths.package_dir(identity);
                let extract_to = dest.clone();
                run_blocking(move || extract::extract_fresh(&archive, &extract_to)).await?;
                self.cache.register(&identity.id, &identity.version, &dest);
                dest
            }
            (None, None) => {
                return Err(EngineError::PackageNotFound(identity.to_string()));
            }
        };

        let target = self.target.clone();
        let to = library_dir.to_path_buf();
        let copied = run_blocking(move || {
            let from = extract::select_library_dir(&source_dir, &target);
            extract::copy_binaries(&from, &to)
        })
        .await?;

        debug!("Copied {} file(s) of {}", copied, identity);
        Ok(())
    }

    async fn inspect_staged(&self, staged: &Staged, package_id: &str) -> ValidationResult {
        let libraries = extract::find_libraries(&staged.library_dir);
        match extract::select_candidate(&libraries, package_id) {
            Some(candidate) => self.inspector.inspect(&candidate).await,
            None => ValidationResult::new(
                ValidationStatus::NoPlugin,
                format!("No plugin binary found in {}", package_id),
            ),
        }
    }

    /// Remove an installed plugin
    pub async fn uninstall(&self, plugin_id: &str) -> InstallResult {
        let _guard = self.gate.lock().await;
        self.uninstall_locked(plugin_id).await
    }

    async fn uninstall_locked(&self, plugin_id: &str) -> InstallResult {
        info!("Uninstalling {}", plugin_id);

        let record = match self.store.find(plugin_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return InstallResult::failed(
                    &EngineError::PluginNotInstalled(plugin_id.to_string()),
                    Vec::new(),
                )
            }
            Err(e) => return InstallResult::failed(&e, Vec::new()),
        };

        self.running.unload(&record.plugin_id);

        let mut warnings = Vec::new();
        if record.install_path.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(&record.install_path).await {
                warn!("Could not delete {}: {}", record.install_path.display(), e);
                warnings.push(format!(
                    "Plugin files could not be fully removed: {}",
                    e
                ));
            }
        }
        if let Some(parent) = record.install_path.parent() {
            extract::remove_if_empty(parent);
        }

        if let Err(e) = self.store.remove(&record.plugin_id).await {
            return InstallResult::failed(&e, warnings);
        }

        info!("Uninstalled {} {}", record.plugin_id, record.version);
        let message = format!("Uninstalled {} {}", record.plugin_name, record.version);
        InstallResult::from_record(&record, message, warnings)
    }

    /// Move an installed plugin to the newest published version
    ///
    /// Not atomic: the old version is removed before the new one is
    /// installed, so a failed install leaves the plugin uninstalled.
    pub async fn update(
        &self,
        plugin_id: &str,
        progress: Option<watch::Sender<InstallProgress>>,
        cancel: &CancellationToken,
    ) -> InstallResult {
        let _guard = self.gate.lock().await;
        let mut reporter = ProgressReporter::new(progress);

        let record = match self.store.find(plugin_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return InstallResult::failed(
                    &EngineError::PluginNotInstalled(plugin_id.to_string()),
                    Vec::new(),
                )
            }
            Err(e) => return InstallResult::failed(&e, Vec::new()),
        };

        reporter.report(2, "Checking for updates");
        let latest = match self.feeds.latest_version(&record.package_id).await {
            Ok(Some(latest)) => latest,
            Ok(None) => {
                return InstallResult::failed(
                    &EngineError::PackageNotFound(record.package_id.clone()),
                    Vec::new(),
                )
            }
            Err(e) => return InstallResult::failed(&e, Vec::new()),
        };

        if latest <= record.version {
            reporter.report(100, "Up to date");
            let message = format!("{} {} is already up to date", record.plugin_name, record.version);
            return InstallResult::from_record(&record, message, Vec::new());
        }

        if let Err(e) = check_cancelled(cancel) {
            return InstallResult::failed(&e, Vec::new());
        }

        info!("Updating {} from {} to {}", plugin_id, record.version, latest);
        let removed = self.uninstall_locked(&record.plugin_id).await;
        if !removed.success {
            return removed;
        }

        let mut result = self
            .install_locked(&record.package_id, &latest, &mut reporter, cancel)
            .await;
        let mut warnings = removed.warnings;
        warnings.append(&mut result.warnings);
        result.warnings = warnings;
        if !result.success {
            result.message = format!(
                "{} ({} {} was removed)",
                result.message, record.plugin_name, record.version
            );
        }
        result
    }

    pub async fn list_installed(&self) -> Result<Vec<InstalledPluginRecord>, EngineError> {
        self.store.load().await
    }

    /// Installed plugins with a newer stable version available
    ///
    /// Plugins whose feeds cannot be reached are skipped.
    pub async fn check_updates(&self) -> Result<Vec<PluginUpdateInfo>, EngineError> {
        let mut updates = Vec::new();

        for record in self.store.load().await? {
            match self.feeds.latest_version(&record.package_id).await {
                Ok(Some(latest)) if latest > record.version => updates.push(PluginUpdateInfo {
                    plugin_id: record.plugin_id,
                    plugin_name: record.plugin_name,
                    package_id: record.package_id,
                    current_version: record.version.to_string(),
                    latest_version: latest.to_string(),
                }),
                Ok(_) => {}
                Err(e) => warn!("Update check for {} failed: {}", record.plugin_id, e),
            }
        }

        Ok(updates)
    }

    pub async fn latest_version(&self, package_id: &str) -> Result<Option<Version>, EngineError> {
        self.feeds.latest_version(package_id).await
    }

    /// Dry run: resolve, check policy, download and inspect the root package
    ///
    /// Nothing is written outside the temp area and no records change.
    pub async fn validate(
        &self,
        package_id: &str,
        version: &Version,
        cancel: &CancellationToken,
    ) -> ValidationResult {
        let identity = PackageIdentity::new(package_id, version.clone());
        match self.run_validate(&identity, cancel).await {
            Ok(result) => result,
            Err((e, dependencies, security_warnings)) => {
                let mut result = ValidationResult::new(
                    ValidationStatus::InvalidPackage,
                    format!("{}. {}", e, e.user_hint()),
                );
                result.total_download_size = dependencies
                    .iter()
                    .fold(0u64, |acc, d| acc.saturating_add(d.size_bytes));
                result.dependencies = dependencies;
                result.security_warnings = security_warnings;
                result
            }
        }
    }

    async fn run_validate(
        &self,
        identity: &PackageIdentity,
        cancel: &CancellationToken,
    ) -> Result<ValidationResult, (EngineError, Vec<DependencyInfo>, Vec<String>)> {
        let mut warnings = Vec::new();
        let resolution = self
            .resolve_checked(identity, cancel, &mut warnings)
            .await
            .map_err(|e| (e, Vec::new(), Vec::new()))?;
        let dependencies = resolution.dependencies.clone();

        let mut security_warnings = Vec::new();
        self.check_policy(identity, &resolution, &mut security_warnings)
            .map_err(|e| (e, dependencies.clone(), security_warnings.clone()))?;

        let fail = |e: EngineError| (e, dependencies.clone(), security_warnings.clone());

        check_cancelled(cancel).map_err(fail)?;
        std::fs::create_dir_all(&self.paths.tmp_dir)
            .map_err(|e| fail(e.into()))?;
        let area = tempfile::Builder::new()
            .prefix("validate-")
            .tempdir_in(&self.paths.tmp_dir)
            .map_err(|e| fail(e.into()))?;

        let archive = self
            .feeds
            .download(identity, area.path())
            .await
            .map_err(fail)?;
        self.check_size(&archive).map_err(fail)?;
        let root_size = std::fs::metadata(&archive).map(|m| m.len()).unwrap_or(0);

        check_cancelled(cancel).map_err(fail)?;
        let staged = self
            .stage_root(&archive, &area.path().join("package"))
            .await
            .map_err(fail)?;
        let mut result = self.inspect_staged(&staged, &identity.id).await;

        result.total_download_size = root_size.saturating_add(resolution.total_size_bytes());
        result.dependencies = dependencies.clone();
        result.security_warnings = security_warnings.clone();
        Ok(result)
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), EngineError> {
    if cancel.is_cancelled() {
        Err(EngineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Run file system work off the async runtime
async fn run_blocking<T, F>(work: F) -> Result<T, EngineError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| EngineError::Extraction(format!("extraction task failed: {}", e)))?
}

/// Best-effort removal of a rejected extraction
fn discard_dir(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        debug!("Could not remove {}: {}", dir.display(), e);
    }
    if let Some(parent) = dir.parent() {
        extract::remove_if_empty(parent);
    }
}
