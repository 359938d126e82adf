//! Security validation of resolved packages
//!
//! Checks run in a fixed order and stop at the first blocking failure:
//!
//! 1. Root package on the blocklist → blocked
//! 2. Allowlist configured and root not on it → blocked
//! 3. Feed not trusted while untrusted feeds are disallowed → warning
//! 4. Per dependency: blocklisted → error, too deep → error,
//!    suspicious name → warning
//! 5. Total dependency size over the limit → error
//! 6. More than [`MAX_DEPENDENCY_COUNT`] dependencies → warning
//!
//! Patterns are matched case-insensitively against the whole package id.
//! `*` matches any run of characters, so `Evil.*` matches `Evil.Plugin` but
//! not `GoodEvil.Plugin`.

use crate::config::SecuritySettings;
use crate::resolver::DependencyInfo;
use regex::Regex;
use semver::Version;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};

/// Substrings that flag a dependency name for review
pub const SUSPICIOUS_TOKENS: &[&str] = &["malicious", "hack", "crack", "keygen", "exploit"];

/// Dependency count above which a warning is raised
pub const MAX_DEPENDENCY_COUNT: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SecurityValidationResult {
    pub is_valid: bool,
    pub is_blocked: bool,
    pub block_reason: Option<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl SecurityValidationResult {
    fn blocked(reason: String) -> Self {
        Self {
            is_valid: false,
            is_blocked: true,
            block_reason: Some(reason),
            ..Default::default()
        }
    }
}

/// Compiled wildcard patterns
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<(String, Regex)>,
}

impl PatternSet {
    pub fn compile(patterns: &[String]) -> Self {
        let patterns = patterns
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .filter_map(|p| match Regex::new(&wildcard_to_regex(p)) {
                Ok(regex) => Some((p.to_string(), regex)),
                Err(e) => {
                    warn!("Ignoring invalid security pattern '{}': {}", p, e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    /// First pattern matching `package_id`
    pub fn find_match(&self, package_id: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(_, regex)| regex.is_match(package_id))
            .map(|(pattern, _)| pattern.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Anchored, case-insensitive regex for a `*` wildcard pattern
pub fn wildcard_to_regex(pattern: &str) -> String {
    let body: Vec<String> = pattern.split('*').map(regex::escape).collect();
    format!("(?i)^{}$", body.join(".*"))
}

pub struct SecurityValidator {
    settings: SecuritySettings,
    allowlist: PatternSet,
    blocklist: PatternSet,
}

impl SecurityValidator {
    pub fn new(settings: SecuritySettings) -> Self {
        let allowlist = PatternSet::compile(&settings.allowlist);
        let blocklist = PatternSet::compile(&settings.blocklist);
        Self {
            settings,
            allowlist,
            blocklist,
        }
    }

    pub fn settings(&self) -> &SecuritySettings {
        &self.settings
    }

    pub fn validate(
        &self,
        package_id: &str,
        version: &Version,
        dependencies: &[DependencyInfo],
        feed_url: Option<&str>,
    ) -> SecurityValidationResult {
        debug!("Validating {} {} ({} dependencies)", package_id, version, dependencies.len());

        if let Some(pattern) = self.blocklist.find_match(package_id) {
            warn!("{} is blocked by pattern '{}'", package_id, pattern);
            return SecurityValidationResult::blocked(format!(
                "Package {} is blocklisted (matches '{}')",
                package_id, pattern
            ));
        }

        if !self.allowlist.is_empty() && self.allowlist.find_match(package_id).is_none() {
            warn!("{} is not on the allowlist", package_id);
            return SecurityValidationResult::blocked(format!(
                "Package {} is not on the allowlist",
                package_id
            ));
        }

        let mut result = SecurityValidationResult::default();

        if let Some(feed) = feed_url {
            if !self.settings.allow_untrusted_feeds && !self.is_trusted_feed(feed) {
                result
                    .warnings
                    .push(format!("Package {} comes from untrusted feed {}", package_id, feed));
            }
        }

        for dependency in dependencies {
            if let Some(pattern) = self.blocklist.find_match(&dependency.package_id) {
                result.errors.push(format!(
                    "Dependency {} is blocklisted (matches '{}')",
                    dependency.package_id, pattern
                ));
            }

            if dependency.depth > self.settings.max_dependency_depth {
                result.errors.push(format!(
                    "Dependency {} at depth {} exceeds the maximum depth of {}",
                    dependency.package_id, dependency.depth, self.settings.max_dependency_depth
                ));
            }

            let lowered = dependency.package_id.to_lowercase();
            if let Some(token) = SUSPICIOUS_TOKENS.iter().find(|t| lowered.contains(*t)) {
                result.warnings.push(format!(
                    "Dependency {} has a suspicious name ('{}')",
                    dependency.package_id, token
                ));
            }
        }

        // Sizes come from the feed; saturate so a huge declaration cannot wrap past the limit
        let total = dependencies
            .iter()
            .fold(0u64, |acc, d| acc.saturating_add(d.size_bytes));
        if total > self.settings.max_total_download_size_bytes {
            result.errors.push(format!(
                "Total dependency size {} bytes exceeds the limit of {} bytes",
                total, self.settings.max_total_download_size_bytes
            ));
        }

        if dependencies.len() > MAX_DEPENDENCY_COUNT {
            result.warnings.push(format!(
                "Package {} pulls in {} dependencies",
                package_id,
                dependencies.len()
            ));
        }

        result.is_valid = result.errors.is_empty();
        for error in &result.errors {
            warn!("Security: {}", error);
        }
        result
    }

    /// Whether the file at `path` fits within the per-package size limit
    ///
    /// A missing or unreadable file fails the check.
    pub fn validate_size(&self, path: &Path) -> bool {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() <= self.settings.max_package_size_bytes => true,
            Ok(meta) => {
                warn!(
                    "{} is {} bytes, limit is {}",
                    path.display(),
                    meta.len(),
                    self.settings.max_package_size_bytes
                );
                false
            }
            Err(e) => {
                warn!("Cannot stat {}: {}", path.display(), e);
                false
            }
        }
    }

    fn is_trusted_feed(&self, feed: &str) -> bool {
        let normalize = |url: &str| url.trim().trim_end_matches('/').to_lowercase();
        let feed = normalize(feed);
        self.settings
            .trusted_feeds
            .iter()
            .any(|trusted| normalize(trusted) == feed)
    }
}
