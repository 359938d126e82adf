//! Dependency resolution
//!
//! Depth-first walk of a package's dependency graph producing a flat,
//! deduplicated, depth-bounded list of dependencies.
//!
//! Conflicts are settled "newest wins": when a package is reached again at a
//! higher version its entry is upgraded in place, but its children are not
//! walked again. A dependency reached at a lower version is dropped silently.

use crate::cache::DependencyCache;
use crate::config::Config;
use crate::feed::{FeedPackage, FeedSet};
use crate::package::{PackageDependency, TargetEnvironment};
use futures::future::{BoxFuture, FutureExt};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One resolved dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyInfo {
    pub package_id: String,
    #[serde(with = "crate::package::version::lenient")]
    pub version: Version,
    /// Range as declared by the package that introduced this dependency
    pub version_range: String,
    /// Environment of the dependency group that declared it
    pub target_environment: TargetEnvironment,
    pub is_transitive: bool,
    /// Distance from the root; direct dependencies are at depth 1
    pub depth: usize,
    pub size_bytes: u64,
}

/// Outcome of [`DependencyResolver::resolve`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolutionResult {
    pub success: bool,
    pub error_message: Option<String>,
    pub dependencies: Vec<DependencyInfo>,
    pub warnings: Vec<String>,
    pub has_circular_dependency: bool,
    /// Feed that served the root package
    pub source_feed: Option<String>,
}

impl ResolutionResult {
    /// Declared size of every dependency, saturating at `u64::MAX`
    pub fn total_size_bytes(&self) -> u64 {
        self.dependencies
            .iter()
            .fold(0u64, |acc, d| acc.saturating_add(d.size_bytes))
    }
}

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Hard recursion ceiling
    pub max_depth: usize,
    /// Package id prefixes provided by the host runtime itself
    pub runtime_prefixes: Vec<String>,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        let host = crate::config::HostConfig::default();
        Self {
            max_depth: 50,
            runtime_prefixes: host.runtime_prefixes,
        }
    }
}

impl ResolverOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_depth: config.resolver.max_depth,
            runtime_prefixes: config.host.runtime_prefixes.clone(),
        }
    }

    fn is_runtime_package(&self, package_id: &str) -> bool {
        let id = package_id.to_lowercase();
        self.runtime_prefixes
            .iter()
            .any(|prefix| id.starts_with(&prefix.to_lowercase()))
    }
}

/// State of a single `resolve` call
struct Walk {
    target: TargetEnvironment,
    cancel: CancellationToken,
    cancelled: bool,
    /// `id:version` pairs already expanded
    visited: HashSet<String>,
    resolved: Vec<DependencyInfo>,
    /// lowercase id -> index into `resolved`
    index: HashMap<String, usize>,
    /// lowercase ids from the root to the node being expanded
    path: Vec<String>,
    warnings: Vec<String>,
    has_cycle: bool,
    source_feed: Option<String>,
    /// lowercase id -> metadata, for this walk only
    metadata: HashMap<String, Vec<FeedPackage>>,
}

impl Walk {
    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

pub struct DependencyResolver {
    feeds: FeedSet,
    cache: Arc<DependencyCache>,
    options: ResolverOptions,
}

impl DependencyResolver {
    pub fn new(feeds: FeedSet, cache: Arc<DependencyCache>, options: ResolverOptions) -> Self {
        Self {
            feeds,
            cache,
            options,
        }
    }

    /// Resolve the dependency graph of `package_id` at `version`
    ///
    /// Never fails outright: problems below the root become warnings, and
    /// `success` is false only when the root package itself could not be
    /// found or the walk was cancelled.
    pub async fn resolve(
        &self,
        package_id: &str,
        version: &Version,
        target: &TargetEnvironment,
        cancel: &CancellationToken,
    ) -> ResolutionResult {
        info!("Resolving {} {} for {}", package_id, version, target);

        let mut walk = Walk {
            target: target.clone(),
            cancel: cancel.clone(),
            cancelled: false,
            visited: HashSet::new(),
            resolved: Vec::new(),
            index: HashMap::new(),
            path: Vec::new(),
            warnings: Vec::new(),
            has_cycle: false,
            source_feed: None,
            metadata: HashMap::new(),
        };

        let root_found = self
            .expand(&mut walk, package_id.to_string(), version.clone(), 0)
            .await;

        if walk.cancelled {
            return ResolutionResult {
                success: false,
                error_message: Some("cancelled".to_string()),
                warnings: walk.warnings,
                ..Default::default()
            };
        }

        let error_message = (!root_found).then(|| {
            format!(
                "Package {} {} was not found on any configured feed",
                package_id, version
            )
        });

        info!(
            "Resolved {} {}: {} dependencies, {} warning(s)",
            package_id,
            version,
            walk.resolved.len(),
            walk.warnings.len()
        );

        ResolutionResult {
            success: root_found,
            error_message,
            dependencies: walk.resolved,
            warnings: walk.warnings,
            has_circular_dependency: walk.has_cycle,
            source_feed: walk.source_feed,
        }
    }

    /// All published versions of `package_id`, fetched once per walk
    async fn metadata(&self, walk: &mut Walk, package_id: &str) -> Option<Vec<FeedPackage>> {
        if walk.cancel.is_cancelled() {
            walk.cancelled = true;
            return None;
        }

        let key = package_id.to_lowercase();
        if let Some(cached) = walk.metadata.get(&key) {
            return Some(cached.clone());
        }

        let packages = self.feeds.search_all(package_id, &mut walk.warnings).await;
        walk.metadata.insert(key, packages.clone());
        Some(packages)
    }

    /// Expand one node; returns false when the node itself cannot be resolved
    fn expand<'a>(
        &'a self,
        walk: &'a mut Walk,
        package_id: String,
        version: Version,
        depth: usize,
    ) -> BoxFuture<'a, bool> {
        async move {
            let key = format!("{}:{}", package_id.to_lowercase(), version);
            if !walk.visited.insert(key) {
                return true;
            }

            let Some(packages) = self.metadata(walk, &package_id).await else {
                return false;
            };
            let Some(node) = packages.iter().find(|p| p.metadata.version == version) else {
                walk.warn(format!(
                    "Package {} {} not found on any feed",
                    package_id, version
                ));
                return false;
            };

            if depth == 0 {
                walk.source_feed = Some(node.feed_url.clone());
            }

            let groups = &node.metadata.dependency_groups;
            let group = match TargetEnvironment::select_nearest(&walk.target, groups, |g| {
                &g.target_environment
            }) {
                Some(group) => Some(group),
                None => {
                    let fallback = TargetEnvironment::select_highest(groups, |g| &g.target_environment);
                    if let Some(group) = fallback {
                        walk.warn(format!(
                            "{} {} has no dependencies for {}; using {}",
                            package_id, version, walk.target, group.target_environment
                        ));
                    }
                    fallback
                }
            };
            let Some(group) = group.cloned() else {
                return true;
            };

            walk.path.push(package_id.to_lowercase());
            for dependency in &group.dependencies {
                self.visit_edge(walk, &package_id, dependency, &group.target_environment, depth)
                    .await;
                if walk.cancelled {
                    break;
                }
            }
            walk.path.pop();

            true
        }
        .boxed()
    }

    /// Handle one dependency edge of `parent_id`
    async fn visit_edge(
        &self,
        walk: &mut Walk,
        parent_id: &str,
        dependency: &PackageDependency,
        environment: &TargetEnvironment,
        depth: usize,
    ) {
        let dep_key = dependency.id.to_lowercase();

        if self.options.is_runtime_package(&dependency.id) {
            debug!("Skipping runtime package {}", dependency.id);
            return;
        }

        if walk.path.contains(&dep_key) {
            let mut cycle = walk.path.clone();
            cycle.push(dep_key);
            walk.has_cycle = true;
            walk.warn(format!("Circular dependency detected: {}", cycle.join(" -> ")));
            return;
        }

        let Some(packages) = self.metadata(walk, &dependency.id).await else {
            return;
        };
        let Some(best) = dependency
            .range
            .best_match(packages.iter().map(|p| &p.metadata.version))
            .cloned()
        else {
            walk.warn(format!(
                "No version of {} satisfies {} (required by {})",
                dependency.id, dependency.range, parent_id
            ));
            return;
        };
        let size_bytes = packages
            .iter()
            .find(|p| p.metadata.version == best)
            .map(|p| p.metadata.size_bytes)
            .unwrap_or(0);

        if self.cache.is_loaded_in_host(&dependency.id, Some(&best)) {
            debug!("{} {} is provided by the host", dependency.id, best);
            return;
        }

        if let Some(&existing) = walk.index.get(&dep_key) {
            let entry = &mut walk.resolved[existing];
            if best > entry.version {
                debug!(
                    "Upgrading {} {} -> {} (required by {})",
                    entry.package_id, entry.version, best, parent_id
                );
                entry.version = best;
                entry.version_range = dependency.range.to_string();
                entry.target_environment = environment.clone();
                entry.size_bytes = size_bytes;
            }
            return;
        }

        let child_depth = depth + 1;
        if child_depth > self.options.max_depth {
            walk.warn(format!(
                "Maximum dependency depth {} exceeded at {} (required by {})",
                self.options.max_depth, dependency.id, parent_id
            ));
            return;
        }

        walk.index.insert(dep_key, walk.resolved.len());
        walk.resolved.push(DependencyInfo {
            package_id: dependency.id.clone(),
            version: best.clone(),
            version_range: dependency.range.to_string(),
            target_environment: environment.clone(),
            is_transitive: child_depth > 1,
            depth: child_depth,
            size_bytes,
        });

        self.expand(walk, dependency.id.clone(), best, child_depth).await;
    }
}
