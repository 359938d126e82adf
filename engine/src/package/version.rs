//! Lenient version parsing and version ranges
//!
//! Feeds publish versions and ranges in a few dialects. Everything is
//! normalised onto `semver`:
//!
//! | input                  | meaning                 |
//! |------------------------|-------------------------|
//! | `1.2`                  | version `1.2.0`         |
//! | `>=2.0.0, <3.0.0`      | semver requirement      |
//! | `>= 2.0.0 < 3.0.0`     | same, space separated   |
//! | `[2.0.0, 3.0.0)`       | interval notation       |
//! | `[1.0.0]`              | exactly `1.0.0`         |
//! | `2.0.0`                | minimum, `>=2.0.0`      |

use sdk::errors::EngineError;
use semver::{Version, VersionReq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Parse a version, accepting missing minor/patch components and a leading `v`
///
/// A fourth numeric component is accepted only when it is zero.
pub fn parse_version(input: &str) -> Result<Version, EngineError> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    if let Ok(version) = Version::parse(trimmed) {
        return Ok(version);
    }

    let split_at = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split_at);

    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit())) {
        return Err(EngineError::InvalidVersion(input.to_string()));
    }
    match parts.len() {
        1 | 2 => parts.resize(3, "0"),
        3 => {}
        4 if parts[3].bytes().all(|b| b == b'0') => parts.truncate(3),
        _ => return Err(EngineError::InvalidVersion(input.to_string())),
    }

    // Drop leading zeros, semver rejects them
    let normalized: Vec<String> = parts
        .iter()
        .map(|p| p.parse::<u64>().map(|n| n.to_string()))
        .collect::<Result<_, _>>()
        .map_err(|_| EngineError::InvalidVersion(input.to_string()))?;

    Version::parse(&format!("{}{}", normalized.join("."), suffix))
        .map_err(|_| EngineError::InvalidVersion(input.to_string()))
}

/// A version constraint as declared by a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    text: String,
    req: VersionReq,
}

impl VersionRange {
    /// Parse any of the supported range dialects
    pub fn parse(input: &str) -> Result<Self, EngineError> {
        let text = input.trim().to_string();
        let normalized = normalize_requirement(&text)?;
        let req = VersionReq::parse(&normalized)
            .map_err(|e| EngineError::InvalidVersion(format!("{}: {}", input, e)))?;
        Ok(Self { text, req })
    }

    /// A range accepting every version
    pub fn any() -> Self {
        Self {
            text: "*".to_string(),
            req: VersionReq::STAR,
        }
    }

    pub fn satisfies(&self, version: &Version) -> bool {
        self.req.matches(version)
    }

    /// Highest version in `candidates` satisfying the range
    pub fn best_match<'a, I>(&self, candidates: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        candidates.into_iter().filter(|v| self.satisfies(v)).max()
    }

    /// The range as originally written
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl std::str::FromStr for VersionRange {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionRange {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionRange> for String {
    fn from(range: VersionRange) -> Self {
        range.text
    }
}

/// Rewrite a range in any supported dialect into semver requirement syntax
fn normalize_requirement(text: &str) -> Result<String, EngineError> {
    if text.is_empty() || text == "*" {
        return Ok("*".to_string());
    }

    if text.starts_with('[') || text.starts_with('(') {
        return normalize_interval(text);
    }

    if text.contains(['<', '>', '=', '^', '~', ',']) {
        return normalize_comparators(text);
    }

    if text.contains(['*', 'x', 'X']) {
        return Ok(text.to_string());
    }

    // Bare version: minimum, inclusive
    let version = parse_version(text)?;
    Ok(format!(">={}", version))
}

fn normalize_interval(text: &str) -> Result<String, EngineError> {
    let invalid = || EngineError::InvalidVersion(text.to_string());

    let lower_inclusive = text.starts_with('[');
    let upper_inclusive = match text.chars().last() {
        Some(']') => true,
        Some(')') => false,
        _ => return Err(invalid()),
    };
    let inner = &text[1..text.len() - 1];

    let Some((lower, upper)) = inner.split_once(',') else {
        // `[1.0.0]` pins an exact version
        if !(lower_inclusive && upper_inclusive) {
            return Err(invalid());
        }
        return Ok(format!("={}", parse_version(inner)?));
    };

    let mut comparators = Vec::new();
    let lower = lower.trim();
    if !lower.is_empty() {
        let op = if lower_inclusive { ">=" } else { ">" };
        comparators.push(format!("{}{}", op, parse_version(lower)?));
    }
    let upper = upper.trim();
    if !upper.is_empty() {
        let op = if upper_inclusive { "<=" } else { "<" };
        comparators.push(format!("{}{}", op, parse_version(upper)?));
    }

    if comparators.is_empty() {
        Ok("*".to_string())
    } else {
        Ok(comparators.join(", "))
    }
}

fn normalize_comparators(text: &str) -> Result<String, EngineError> {
    let spaced = text.replace(',', " ");
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op: Option<&str> = None;

    for token in spaced.split_whitespace() {
        let is_operator_only = token.chars().all(|c| matches!(c, '<' | '>' | '=' | '^' | '~'));
        if is_operator_only {
            if pending_op.is_some() {
                return Err(EngineError::InvalidVersion(text.to_string()));
            }
            pending_op = Some(token);
            continue;
        }
        match pending_op.take() {
            Some(op) => comparators.push(format!("{}{}", op, token)),
            None => comparators.push(token.to_string()),
        }
    }

    if pending_op.is_some() || comparators.is_empty() {
        return Err(EngineError::InvalidVersion(text.to_string()));
    }

    Ok(comparators.join(", "))
}

/// Serde adapter for `semver::Version` fields that accepts lenient input
pub mod lenient {
    use super::*;

    pub fn serialize<S: Serializer>(version: &Version, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(version)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Version, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_version(&raw).map_err(serde::de::Error::custom)
    }
}
