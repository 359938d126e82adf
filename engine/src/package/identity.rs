use super::version::parse_version;
use sdk::errors::EngineError;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A package id at a concrete version
///
/// Ids compare case-insensitively; the original spelling is kept for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageIdentity {
    pub id: String,
    #[serde(with = "super::version::lenient")]
    pub version: Version,
}

impl PackageIdentity {
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }

    pub fn parse(id: &str, version: &str) -> Result<Self, EngineError> {
        Ok(Self::new(id, parse_version(version)?))
    }

    /// Cache key: `"{id_lower}:{version}"`
    pub fn key(&self) -> String {
        Self::key_for(&self.id, &self.version)
    }

    pub fn key_for(id: &str, version: &Version) -> String {
        format!("{}:{}", id.to_lowercase(), version)
    }

    pub fn id_lower(&self) -> String {
        self.id.to_lowercase()
    }
}

impl PartialEq for PackageIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id.eq_ignore_ascii_case(&other.id) && self.version == other.version
    }
}

impl Eq for PackageIdentity {}

impl Hash for PackageIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.to_lowercase().hash(state);
        self.version.hash(state);
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}
