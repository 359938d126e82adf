//! HTTP feed client
//!
//! Layout served by a feed rooted at `{base}`:
//!
//! - `GET {base}/packages/{id_lower}/index.json` returns a [`PackageIndex`];
//!   404 means the package is unknown
//! - `GET {base}/packages/{id_lower}/{version}/{id_lower}.{version}.zip` is the
//!   artifact, unless the metadata names another `download_url`

use super::{artifact_file_name, verifier, FeedClient};
use crate::package::{PackageIdentity, PackageIndex, PackageMetadata};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use sdk::errors::EngineError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

pub struct HttpFeedClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpFeedClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("trawl/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn index_url(&self, package_id: &str) -> String {
        format!("{}/packages/{}/index.json", self.base_url, package_id.to_lowercase())
    }

    fn default_artifact_url(&self, identity: &PackageIdentity) -> String {
        format!(
            "{}/packages/{}/{}/{}",
            self.base_url,
            identity.id_lower(),
            identity.version,
            artifact_file_name(identity)
        )
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    fn feed_url(&self) -> &str {
        &self.base_url
    }

    async fn search_metadata(&self, package_id: &str) -> Result<Vec<PackageMetadata>, EngineError> {
        let url = self.index_url(package_id);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::Network(format!("{}: {}", self.base_url, e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(EngineError::Feed(format!(
                "{} answered {} for {}",
                self.base_url,
                response.status(),
                package_id
            )));
        }

        let index: PackageIndex = response
            .json()
            .await
            .map_err(|e| EngineError::Feed(format!("Malformed index for {}: {}", package_id, e)))?;

        Ok(index.versions)
    }

    async fn download_artifact(
        &self,
        identity: &PackageIdentity,
        dest_dir: &Path,
    ) -> Result<PathBuf, EngineError> {
        let metadata = self
            .search_metadata(&identity.id)
            .await?
            .into_iter()
            .find(|m| m.version == identity.version)
            .ok_or_else(|| EngineError::PackageNotFound(identity.to_string()))?;

        let url = metadata
            .download_url
            .clone()
            .unwrap_or_else(|| self.default_artifact_url(identity));

        info!("Downloading {} from {}", identity, url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::Network(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(EngineError::Feed(format!(
                "{} answered {} for {}",
                self.base_url,
                response.status(),
                identity
            )));
        }

        tokio::fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join(artifact_file_name(identity));
        let mut file = tokio::fs::File::create(&dest).await?;
        let mut hasher = Sha256::new();

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| EngineError::Network(format!("{}: {}", url, e)))?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        if let Some(expected) = &metadata.sha256 {
            if let Err(e) = verifier::verify_digest(hasher, expected) {
                tokio::fs::remove_file(&dest).await.ok();
                return Err(e);
            }
            debug!("Hash verified for {}", identity);
        }

        Ok(dest)
    }
}
