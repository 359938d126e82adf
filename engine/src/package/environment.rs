//! Target runtime environments
//!
//! A package ships binaries per runtime profile and declares dependencies per
//! profile. Profiles are written `<family><major>.<minor>`, e.g. `trawl1.2`,
//! or `any` for binaries that run everywhere.

use super::version::parse_version;
use sdk::errors::EngineError;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TargetEnvironment {
    /// Environment-neutral
    Any,
    /// A versioned runtime family
    Runtime { family: String, version: Version },
}

impl TargetEnvironment {
    pub fn parse(input: &str) -> Result<Self, EngineError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("any") {
            return Ok(Self::Any);
        }

        let split = trimmed
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| EngineError::Config(format!("Invalid target environment '{}'", input)))?;
        let (family, version) = trimmed.split_at(split);
        let family = family.trim_end_matches(['-', '_']);
        if family.is_empty() {
            return Err(EngineError::Config(format!(
                "Invalid target environment '{}': missing family",
                input
            )));
        }

        Ok(Self::Runtime {
            family: family.to_lowercase(),
            version: parse_version(version)?,
        })
    }

    /// Environment of this host build
    pub fn host() -> Self {
        let version = parse_version(env!("CARGO_PKG_VERSION")).unwrap_or(Version::new(0, 1, 0));
        Self::Runtime {
            family: "trawl".to_string(),
            version: Version::new(version.major, version.minor, 0),
        }
    }

    /// Whether binaries built for `self` run on `target`
    ///
    /// `Any` runs everywhere. A runtime build runs on the same family at an
    /// equal or newer version.
    pub fn is_compatible_with(&self, target: &TargetEnvironment) -> bool {
        match (self, target) {
            (Self::Any, _) => true,
            (Self::Runtime { .. }, Self::Any) => false,
            (
                Self::Runtime { family, version },
                Self::Runtime {
                    family: target_family,
                    version: target_version,
                },
            ) => family.eq_ignore_ascii_case(target_family) && version <= target_version,
        }
    }

    fn version(&self) -> Option<&Version> {
        match self {
            Self::Any => None,
            Self::Runtime { version, .. } => Some(version),
        }
    }

    /// Rank of a compatible candidate; higher is nearer
    fn nearness(&self, target: &TargetEnvironment) -> Option<(u8, Version)> {
        if !self.is_compatible_with(target) {
            return None;
        }
        match self {
            Self::Any => Some((0, Version::new(0, 0, 0))),
            Self::Runtime { version, .. } if self == target => Some((2, version.clone())),
            Self::Runtime { version, .. } => Some((1, version.clone())),
        }
    }

    /// Pick the candidate nearest to `target`
    ///
    /// Preference: exact match, then the same family at the highest
    /// compatible version, then `Any`. Returns `None` when nothing is
    /// compatible.
    pub fn select_nearest<'a, T, F>(target: &TargetEnvironment, items: &'a [T], env_of: F) -> Option<&'a T>
    where
        F: Fn(&T) -> &TargetEnvironment,
    {
        items
            .iter()
            .filter_map(|item| env_of(item).nearness(target).map(|rank| (rank, item)))
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, item)| item)
    }

    /// Pick the candidate with the highest runtime version, ignoring compatibility
    pub fn select_highest<'a, T, F>(items: &'a [T], env_of: F) -> Option<&'a T>
    where
        F: Fn(&T) -> &TargetEnvironment,
    {
        items.iter().max_by(|a, b| env_of(a).version().cmp(&env_of(b).version()))
    }
}

impl fmt::Display for TargetEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Runtime { family, version } if version.patch == 0 => {
                write!(f, "{}{}.{}", family, version.major, version.minor)
            }
            Self::Runtime { family, version } => write!(f, "{}{}", family, version),
        }
    }
}

impl std::str::FromStr for TargetEnvironment {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TargetEnvironment {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TargetEnvironment> for String {
    fn from(env: TargetEnvironment) -> Self {
        env.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(s: &str) -> TargetEnvironment {
        TargetEnvironment::parse(s).unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(env("any"), TargetEnvironment::Any);
        assert_eq!(env("ANY"), TargetEnvironment::Any);
        assert_eq!(env("trawl1.2").to_string(), "trawl1.2");
        assert_eq!(env("Trawl1.2"), env("trawl1.2"));
        assert_eq!(env("net6").to_string(), "net6.0");
        assert!(TargetEnvironment::parse("1.2").is_err());
        assert!(TargetEnvironment::parse("trawl").is_err());
    }

    #[test]
    fn test_compatibility() {
        let host = env("trawl1.2");
        assert!(env("trawl1.0").is_compatible_with(&host));
        assert!(env("trawl1.2").is_compatible_with(&host));
        assert!(!env("trawl1.3").is_compatible_with(&host));
        assert!(!env("other1.0").is_compatible_with(&host));
        assert!(TargetEnvironment::Any.is_compatible_with(&host));
    }

    #[test]
    fn test_select_nearest_prefers_exact_then_highest_then_any() {
        let host = env("trawl1.2");
        let candidates = vec![env("any"), env("trawl1.0"), env("trawl1.1"), env("trawl2.0")];
        let picked = TargetEnvironment::select_nearest(&host, &candidates, |e| e);
        assert_eq!(picked, Some(&env("trawl1.1")));

        let with_exact = vec![env("trawl1.1"), env("trawl1.2"), env("any")];
        let picked = TargetEnvironment::select_nearest(&host, &with_exact, |e| e);
        assert_eq!(picked, Some(&env("trawl1.2")));

        let only_any = vec![env("trawl3.0"), env("any")];
        let picked = TargetEnvironment::select_nearest(&host, &only_any, |e| e);
        assert_eq!(picked, Some(&TargetEnvironment::Any));
    }

    #[test]
    fn test_select_highest_fallback() {
        let host = env("trawl1.0");
        let candidates = vec![env("trawl2.0"), env("trawl3.1"), env("other9.0")];
        assert!(TargetEnvironment::select_nearest(&host, &candidates, |e| e).is_none());
        let picked = TargetEnvironment::select_highest(&candidates, |e| e);
        assert_eq!(picked, Some(&env("other9.0")));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&env("trawl1.2")).unwrap();
        assert_eq!(json, "\"trawl1.2\"");
        let back: TargetEnvironment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env("trawl1.2"));
    }
}
