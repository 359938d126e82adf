//! Package metadata as published by a feed

use super::{PackageIdentity, TargetEnvironment, VersionRange};
use semver::Version;
use serde::{Deserialize, Serialize};

/// One version of a package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub id: String,
    #[serde(with = "super::version::lenient")]
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Artifact location; feeds fall back to their conventional layout when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default)]
    pub size_bytes: u64,
    /// Hex-encoded SHA-256 of the artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default)]
    pub dependency_groups: Vec<DependencyGroup>,
}

impl PackageMetadata {
    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity::new(self.id.clone(), self.version.clone())
    }
}

/// Dependencies declared for one target environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyGroup {
    pub target_environment: TargetEnvironment,
    #[serde(default)]
    pub dependencies: Vec<PackageDependency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDependency {
    pub id: String,
    #[serde(default = "VersionRange::any")]
    pub range: VersionRange,
}

/// Response body of a feed's package index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageIndex {
    pub id: String,
    #[serde(default)]
    pub versions: Vec<PackageMetadata>,
}
