//! Integration tests for the security policy

mod common;

use common::v;
use semver::Version;
use tempfile::TempDir;
use trawl_engine::config::SecuritySettings;
use trawl_engine::package::TargetEnvironment;
use trawl_engine::resolver::DependencyInfo;
use trawl_engine::security::{SecurityValidator, MAX_DEPENDENCY_COUNT};

fn dep(id: &str, depth: usize, size_bytes: u64) -> DependencyInfo {
    DependencyInfo {
        package_id: id.to_string(),
        version: Version::new(1, 0, 0),
        version_range: "*".to_string(),
        target_environment: TargetEnvironment::Any,
        is_transitive: depth > 1,
        depth,
        size_bytes,
    }
}

fn validator(settings: SecuritySettings) -> SecurityValidator {
    SecurityValidator::new(settings)
}

#[test]
fn test_blocklist_wins_over_allowlist() {
    let settings = SecuritySettings {
        allowlist: vec!["Evil.Plugin".to_string()],
        blocklist: vec!["Evil.Plugin".to_string()],
        ..Default::default()
    };

    let result = validator(settings).validate("Evil.Plugin", &v("1.0.0"), &[], None);

    assert!(result.is_blocked);
    assert!(!result.is_valid);
    assert!(result.block_reason.unwrap().contains("blocklisted"));
}

#[test]
fn test_wildcard_blocklist() {
    let settings = SecuritySettings {
        blocklist: vec!["Evil.*".to_string()],
        ..Default::default()
    };
    let validator = validator(settings);

    assert!(validator.validate("Evil.Plugin", &v("1.0.0"), &[], None).is_blocked);
    assert!(validator.validate("evil.tools", &v("1.0.0"), &[], None).is_blocked);
    assert!(!validator.validate("GoodEvil.Plugin", &v("1.0.0"), &[], None).is_blocked);
    assert!(!validator.validate("Evil", &v("1.0.0"), &[], None).is_blocked);
}

#[test]
fn test_leading_and_embedded_wildcards() {
    let settings = SecuritySettings {
        blocklist: vec!["*.Miner".to_string(), "Crypto*Stealer".to_string()],
        ..Default::default()
    };
    let validator = validator(settings);

    assert!(validator.validate("Free.Miner", &v("1.0.0"), &[], None).is_blocked);
    assert!(validator.validate("CryptoWalletStealer", &v("1.0.0"), &[], None).is_blocked);
    assert!(!validator.validate("Miner.Tools", &v("1.0.0"), &[], None).is_blocked);
}

#[test]
fn test_allowlist_restricts_roots() {
    let settings = SecuritySettings {
        allowlist: vec!["com.example.*".to_string()],
        ..Default::default()
    };
    let validator = validator(settings);

    let allowed = validator.validate("com.example.widget", &v("1.2.0"), &[], None);
    assert!(allowed.is_valid);

    let denied = validator.validate("org.other.widget", &v("1.0.0"), &[], None);
    assert!(denied.is_blocked);
    assert!(denied.block_reason.unwrap().contains("not on the allowlist"));
}

#[test]
fn test_blocklisted_dependency_is_an_error() {
    let settings = SecuritySettings {
        blocklist: vec!["bad-*".to_string()],
        ..Default::default()
    };

    let result = validator(settings).validate(
        "app",
        &v("1.0.0"),
        &[dep("good", 1, 10), dep("bad-lib", 2, 10)],
        None,
    );

    assert!(!result.is_blocked);
    assert!(!result.is_valid);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("bad-lib"));
}

#[test]
fn test_untrusted_feed_warns() {
    let settings = SecuritySettings {
        trusted_feeds: vec!["https://plugins.trawl.dev/v1/".to_string()],
        allow_untrusted_feeds: false,
        ..Default::default()
    };
    let validator = validator(settings);

    let trusted = validator.validate("app", &v("1.0.0"), &[], Some("https://PLUGINS.trawl.dev/v1"));
    assert!(trusted.warnings.is_empty());

    let untrusted = validator.validate("app", &v("1.0.0"), &[], Some("https://mirror.example"));
    assert!(untrusted.is_valid);
    assert!(untrusted.warnings[0].contains("untrusted feed"));
}

#[test]
fn test_untrusted_feed_allowed_by_default() {
    let result = validator(SecuritySettings::default()).validate(
        "app",
        &v("1.0.0"),
        &[],
        Some("https://mirror.example"),
    );
    assert!(result.warnings.is_empty());
}

#[test]
fn test_dependency_depth_limit() {
    let settings = SecuritySettings {
        max_dependency_depth: 2,
        ..Default::default()
    };

    let result = validator(settings).validate(
        "app",
        &v("1.0.0"),
        &[dep("a", 1, 0), dep("b", 2, 0), dep("c", 3, 0)],
        None,
    );

    assert!(!result.is_valid);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("depth 3"));
}

#[test]
fn test_total_size_limit() {
    let settings = SecuritySettings {
        max_total_download_size_bytes: 100,
        ..Default::default()
    };
    let validator = validator(settings);

    let within = validator.validate("app", &v("1.0.0"), &[dep("a", 1, 50), dep("b", 1, 50)], None);
    assert!(within.is_valid);

    let over = validator.validate("app", &v("1.0.0"), &[dep("a", 1, 60), dep("b", 1, 50)], None);
    assert!(!over.is_valid);
    assert!(over.errors[0].contains("110 bytes"));
}

#[test]
fn test_huge_declared_sizes_do_not_wrap() {
    let validator = validator(SecuritySettings::default());

    let result = validator.validate(
        "root",
        &v("1.0.0"),
        &[dep("a", 1, u64::MAX), dep("b", 1, 2)],
        None,
    );

    assert!(!result.is_valid);
    assert!(result.errors[0].contains(&u64::MAX.to_string()));
}

#[test]
fn test_suspicious_names_warn() {
    let result = validator(SecuritySettings::default()).validate(
        "app",
        &v("1.0.0"),
        &[dep("License-KeyGen", 1, 0), dep("json", 1, 0)],
        None,
    );

    assert!(result.is_valid);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("License-KeyGen"));
}

#[test]
fn test_many_dependencies_warn() {
    let deps: Vec<_> = (0..=MAX_DEPENDENCY_COUNT)
        .map(|i| dep(&format!("dep{}", i), 1, 0))
        .collect();

    let result = validator(SecuritySettings::default()).validate("app", &v("1.0.0"), &deps, None);

    assert!(result.is_valid);
    assert!(result.warnings.iter().any(|w| w.contains("51 dependencies")));
}

#[test]
fn test_validate_size() {
    let temp = TempDir::new().unwrap();
    let small = temp.path().join("small.zip");
    let large = temp.path().join("large.zip");
    std::fs::write(&small, vec![0u8; 10]).unwrap();
    std::fs::write(&large, vec![0u8; 11]).unwrap();

    let validator = validator(SecuritySettings {
        max_package_size_bytes: 10,
        ..Default::default()
    });

    assert!(validator.validate_size(&small));
    assert!(!validator.validate_size(&large));
    assert!(!validator.validate_size(&temp.path().join("missing.zip")));
}

#[test]
fn test_security_file_round_trip() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("security.toml");

    let created = SecuritySettings::load_or_create(&path).unwrap();
    assert!(path.exists());
    assert_eq!(created, SecuritySettings::default());

    let mut edited = created;
    edited.blocklist.push("Evil.*".to_string());
    edited.save(&path).unwrap();

    let reloaded = SecuritySettings::load_from_path(&path).unwrap();
    assert_eq!(reloaded.blocklist, vec!["Evil.*".to_string()]);
}
