//! Package feeds
//!
//! A feed publishes package metadata and artifacts. The engine only talks to
//! feeds through the [`FeedClient`] trait; [`HttpFeedClient`] is the bundled
//! implementation. Multiple feeds are combined into a [`FeedSet`] and tried in
//! configuration order.

mod http;
pub mod verifier;

pub use http::HttpFeedClient;

use crate::config::FeedsConfig;
use crate::package::{PackageIdentity, PackageMetadata};
use async_trait::async_trait;
use sdk::errors::EngineError;
use semver::Version;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Capability to query and download packages from one feed
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Base URL identifying this feed (used for the trust check)
    fn feed_url(&self) -> &str;

    /// All published versions of `package_id`
    ///
    /// An unknown package is an empty list, not an error.
    async fn search_metadata(&self, package_id: &str) -> Result<Vec<PackageMetadata>, EngineError>;

    /// Download the artifact of `identity` into `dest_dir`, returning the file path
    async fn download_artifact(
        &self,
        identity: &PackageIdentity,
        dest_dir: &Path,
    ) -> Result<PathBuf, EngineError>;
}

/// Metadata together with the feed that published it
#[derive(Debug, Clone)]
pub struct FeedPackage {
    pub metadata: PackageMetadata,
    pub feed_url: String,
}

/// Ordered collection of feeds; the first feed that answers wins
#[derive(Clone, Default)]
pub struct FeedSet {
    feeds: Vec<Arc<dyn FeedClient>>,
}

impl FeedSet {
    pub fn new(feeds: Vec<Arc<dyn FeedClient>>) -> Self {
        Self { feeds }
    }

    /// Build HTTP clients for every configured source
    pub fn from_config(config: &FeedsConfig) -> Result<Self, EngineError> {
        let mut feeds: Vec<Arc<dyn FeedClient>> = Vec::with_capacity(config.sources.len());
        for source in &config.sources {
            feeds.push(Arc::new(HttpFeedClient::new(
                source,
                std::time::Duration::from_secs(config.timeout_secs),
            )?));
        }
        Ok(Self { feeds })
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Query every feed and merge the answers
    ///
    /// Versions are deduplicated with the earlier feed taking precedence.
    /// Feed failures are appended to `warnings`.
    pub async fn search_all(&self, package_id: &str, warnings: &mut Vec<String>) -> Vec<FeedPackage> {
        let mut merged: Vec<FeedPackage> = Vec::new();

        for feed in &self.feeds {
            match feed.search_metadata(package_id).await {
                Ok(versions) => {
                    debug!(
                        "Feed {} returned {} version(s) of {}",
                        feed.feed_url(),
                        versions.len(),
                        package_id
                    );
                    for metadata in versions {
                        if !metadata.id.eq_ignore_ascii_case(package_id) {
                            continue;
                        }
                        if merged.iter().any(|p| p.metadata.version == metadata.version) {
                            continue;
                        }
                        merged.push(FeedPackage {
                            metadata,
                            feed_url: feed.feed_url().to_string(),
                        });
                    }
                }
                Err(e) => {
                    warn!("Feed {} failed for {}: {}", feed.feed_url(), package_id, e);
                    warnings.push(format!("Feed {} failed for {}: {}", feed.feed_url(), package_id, e));
                }
            }
        }

        merged
    }

    /// Highest published version of `package_id` across all feeds
    pub async fn latest_version(&self, package_id: &str) -> Result<Option<Version>, EngineError> {
        let mut warnings = Vec::new();
        let packages = self.search_all(package_id, &mut warnings).await;
        if packages.is_empty() && !warnings.is_empty() && warnings.len() == self.feeds.len() {
            return Err(EngineError::Feed(warnings.join("; ")));
        }
        Ok(packages
            .into_iter()
            .map(|p| p.metadata.version)
            .filter(|v| v.pre.is_empty())
            .max())
    }

    /// Download `identity` from the first feed that can serve it
    pub async fn download(&self, identity: &PackageIdentity, dest_dir: &Path) -> Result<PathBuf, EngineError> {
        let mut failures = Vec::new();

        for feed in &self.feeds {
            match feed.download_artifact(identity, dest_dir).await {
                Ok(path) => return Ok(path),
                Err(e @ EngineError::HashMismatch(_)) => return Err(e),
                Err(e) => {
                    warn!("Download of {} from {} failed: {}", identity, feed.feed_url(), e);
                    failures.push(format!("{}: {}", feed.feed_url(), e));
                }
            }
        }

        if failures.is_empty() {
            Err(EngineError::Feed("No package feeds configured".to_string()))
        } else {
            Err(EngineError::Feed(format!(
                "Could not download {}: {}",
                identity,
                failures.join("; ")
            )))
        }
    }
}

/// Conventional artifact file name: `{id_lower}.{version}.zip`
pub fn artifact_file_name(identity: &PackageIdentity) -> String {
    format!("{}.{}.zip", identity.id_lower(), identity.version)
}
