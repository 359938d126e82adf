//! Integration tests for the package installer
//!
//! Packages are served by an in-memory feed and binaries are checked by a
//! fake inspector, so these tests exercise the orchestration (downloads,
//! extraction, dependency placement, metadata) without loading native code.

mod common;

use common::{installer, library_archive, meta, v, FakeInspector, MockFeed};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use trawl_engine::config::SecuritySettings;
use trawl_engine::inspector::ValidationStatus;
use trawl_engine::installer::{extract::EXTRACTED_MARKER, progress_channel, RunningPlugins};
use trawl_engine::platform::library_filename;

fn widget_feed() -> Arc<MockFeed> {
    let feed = MockFeed::new();
    feed.publish_with(
        meta("com.example.widget", "1.2.0", &[("lib-json", ">= 2.0.0 < 3.0.0")]),
        library_archive("trawl0.1", "widget"),
    );
    for version in ["1.9.0", "2.0.0", "2.5.0", "3.0.0"] {
        feed.publish_with(meta("lib-json", version, &[]), library_archive("any", "lib_json"));
    }
    feed
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[derive(Default)]
struct RecordingHook {
    unloaded: Mutex<Vec<String>>,
}

impl RunningPlugins for RecordingHook {
    fn unload(&self, plugin_id: &str) {
        self.unloaded.lock().unwrap().push(plugin_id.to_string());
    }
}

#[tokio::test]
async fn test_install_end_to_end() {
    let data = TempDir::new().unwrap();
    let feed = widget_feed();
    let inspector = FakeInspector::valid("widget");
    let installer = installer(data.path(), &feed, Arc::clone(&inspector), SecuritySettings::default());
    let (progress, updates) = progress_channel();

    let result = installer
        .install("com.example.widget", &v("1.2.0"), Some(progress), &CancellationToken::new())
        .await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.plugin_id.as_deref(), Some("widget"));
    assert_eq!(result.version.as_deref(), Some("1.2.0"));
    assert_eq!(updates.borrow().percent_complete, 100);

    // Only the selected dependency version was fetched
    assert_eq!(
        feed.downloads(),
        vec!["com.example.widget:1.2.0".to_string(), "lib-json:2.5.0".to_string()]
    );

    let lib_dir = data.path().join("plugins/com.example.widget/1.2.0/lib/trawl0.1");
    assert_eq!(
        file_names(&lib_dir),
        {
            let mut expected = vec![library_filename("lib_json"), library_filename("widget")];
            expected.sort();
            expected
        }
    );
    assert!(data.path().join("packages/lib-json/2.5.0").join(EXTRACTED_MARKER).exists());
    assert_eq!(inspector.inspected(), vec![lib_dir.join(library_filename("widget"))]);

    let records = installer.list_installed().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].package_id, "com.example.widget");
    assert_eq!(records[0].dependencies.len(), 1);
    assert_eq!(records[0].dependencies[0].version, v("2.5.0"));

    let keys: Vec<_> = installer.cache().entries().into_iter().map(|e| e.key).collect();
    assert_eq!(keys, vec!["com.example.widget:1.2.0", "lib-json:2.5.0"]);

    // The download area is gone
    assert!(file_names(&data.path().join("tmp")).is_empty());
}

#[tokio::test]
async fn test_shared_dependency_is_reused() {
    let data = TempDir::new().unwrap();
    let feed = MockFeed::new();
    for id in ["alpha", "beta"] {
        feed.publish_with(meta(id, "1.0.0", &[("common-lib", "1.0.0")]), library_archive("any", id));
    }
    feed.publish_with(meta("common-lib", "1.0.0", &[]), library_archive("any", "common"));

    let installer = installer(data.path(), &feed, FakeInspector::valid("plugin"), SecuritySettings::default());
    let cancel = CancellationToken::new();

    assert!(installer.install("alpha", &v("1.0.0"), None, &cancel).await.success);
    assert!(installer.install("beta", &v("1.0.0"), None, &cancel).await.success);

    assert_eq!(feed.download_count("common-lib"), 1);
    assert!(data
        .path()
        .join("plugins/beta/1.0.0/lib/any")
        .join(library_filename("common"))
        .exists());
}

#[tokio::test]
async fn test_extracted_dependency_survives_restart() {
    let data = TempDir::new().unwrap();
    let feed = MockFeed::new();
    for id in ["alpha", "beta"] {
        feed.publish_with(meta(id, "1.0.0", &[("common-lib", "1.0.0")]), library_archive("any", id));
    }
    feed.publish_with(meta("common-lib", "1.0.0", &[]), library_archive("any", "common"));
    let cancel = CancellationToken::new();

    let first = installer(data.path(), &feed, FakeInspector::valid("alpha"), SecuritySettings::default());
    assert!(first.install("alpha", &v("1.0.0"), None, &cancel).await.success);
    drop(first);

    // Fresh process: empty cache, same data directory
    let second = installer(data.path(), &feed, FakeInspector::valid("beta"), SecuritySettings::default());
    assert!(second.cache().is_empty());
    assert!(second.install("beta", &v("1.0.0"), None, &cancel).await.success);

    assert_eq!(feed.download_count("common-lib"), 1);
    assert_eq!(second.list_installed().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_blocklisted_dependency_aborts_install() {
    let data = TempDir::new().unwrap();
    let feed = MockFeed::new();
    feed.publish_with(meta("app", "1.0.0", &[("Evil.Helper", "*")]), library_archive("any", "app"));
    feed.publish_with(meta("Evil.Helper", "1.0.0", &[]), library_archive("any", "helper"));

    let security = SecuritySettings {
        blocklist: vec!["Evil.*".to_string()],
        ..Default::default()
    };
    let installer = installer(data.path(), &feed, FakeInspector::valid("app"), security);

    let result = installer
        .install("app", &v("1.0.0"), None, &CancellationToken::new())
        .await;

    assert!(!result.success);
    assert!(result.message.contains("blocklisted"), "{}", result.message);
    assert!(!data.path().join("plugins/app").exists());
    assert!(installer.list_installed().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_blocklisted_root_is_rejected() {
    let data = TempDir::new().unwrap();
    let feed = MockFeed::new();
    feed.publish_with(meta("Evil.Plugin", "1.0.0", &[]), library_archive("any", "plugin"));

    let security = SecuritySettings {
        blocklist: vec!["evil.*".to_string()],
        ..Default::default()
    };
    let installer = installer(data.path(), &feed, FakeInspector::valid("evil"), security);

    let result = installer
        .install("Evil.Plugin", &v("1.0.0"), None, &CancellationToken::new())
        .await;

    assert!(!result.success);
    assert!(result.message.contains("Security policy violation"));
}

#[tokio::test]
async fn test_oversize_package_is_rejected() {
    let data = TempDir::new().unwrap();
    let feed = MockFeed::new();
    feed.publish_with(meta("app", "1.0.0", &[]), library_archive("any", "app"));

    let security = SecuritySettings {
        max_package_size_bytes: 10,
        ..Default::default()
    };
    let installer = installer(data.path(), &feed, FakeInspector::valid("app"), security);

    let result = installer
        .install("app", &v("1.0.0"), None, &CancellationToken::new())
        .await;

    assert!(!result.success);
    assert!(result.message.contains("Package too large"));
    assert!(!data.path().join("plugins/app").exists());
}

#[tokio::test]
async fn test_missing_dependency_artifact_is_a_warning() {
    let data = TempDir::new().unwrap();
    let feed = MockFeed::new();
    feed.publish_with(meta("app", "1.0.0", &[("phantom", "*")]), library_archive("any", "app"));
    feed.publish(meta("phantom", "1.0.0", &[]));

    let installer = installer(data.path(), &feed, FakeInspector::valid("app"), SecuritySettings::default());
    let result = installer
        .install("app", &v("1.0.0"), None, &CancellationToken::new())
        .await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("Failed to download dependency phantom"));
}

#[tokio::test]
async fn test_failed_inspection_leaves_nothing_behind() {
    let data = TempDir::new().unwrap();
    let feed = MockFeed::new();
    feed.publish_with(meta("app", "1.0.0", &[]), library_archive("any", "app"));

    let inspector = FakeInspector::with_status("app", ValidationStatus::NoPlugin);
    let installer = installer(data.path(), &feed, inspector, SecuritySettings::default());

    let result = installer
        .install("app", &v("1.0.0"), None, &CancellationToken::new())
        .await;

    assert!(!result.success);
    assert!(result.message.contains("no plugin"), "{}", result.message);
    assert!(!data.path().join("plugins/app").exists());
    assert!(installer.list_installed().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_package_without_binaries_has_no_plugin() {
    let data = TempDir::new().unwrap();
    let feed = MockFeed::new();
    feed.publish_with(
        meta("docs-only", "1.0.0", &[]),
        common::zip_bytes(&[("README.md".to_string(), b"hello".to_vec())]),
    );

    let inspector = FakeInspector::valid("docs");
    let installer = installer(data.path(), &feed, Arc::clone(&inspector), SecuritySettings::default());
    let result = installer
        .install("docs-only", &v("1.0.0"), None, &CancellationToken::new())
        .await;

    assert!(!result.success);
    assert!(result.message.contains("No plugin binary found"));
    assert!(inspector.inspected().is_empty());
}

#[tokio::test]
async fn test_cancelled_install_changes_nothing() {
    let data = TempDir::new().unwrap();
    let feed = widget_feed();
    let installer = installer(data.path(), &feed, FakeInspector::valid("widget"), SecuritySettings::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = installer
        .install("com.example.widget", &v("1.2.0"), None, &cancel)
        .await;

    assert!(!result.success);
    assert!(result.message.contains("cancelled"));
    assert!(feed.downloads().is_empty());
    assert!(installer.list_installed().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_uninstall_removes_files_and_record() {
    let data = TempDir::new().unwrap();
    let feed = widget_feed();
    let hook = Arc::new(RecordingHook::default());
    let installer = installer(data.path(), &feed, FakeInspector::valid("widget"), SecuritySettings::default())
        .with_running_plugins(Arc::clone(&hook) as Arc<dyn RunningPlugins>);
    let cancel = CancellationToken::new();

    assert!(installer.install("com.example.widget", &v("1.2.0"), None, &cancel).await.success);

    let result = installer.uninstall("widget").await;

    assert!(result.success, "{}", result.message);
    assert_eq!(*hook.unloaded.lock().unwrap(), vec!["widget".to_string()]);
    assert!(!data.path().join("plugins/com.example.widget").exists());
    assert!(installer.list_installed().await.unwrap().is_empty());
    // Shared extraction stays for other plugins
    assert!(data.path().join("packages/lib-json/2.5.0").exists());

    let again = installer.uninstall("widget").await;
    assert!(!again.success);
    assert!(again.message.contains("not installed"));
}

#[tokio::test]
async fn test_reinstall_replaces_previous_version() {
    let data = TempDir::new().unwrap();
    let feed = MockFeed::new();
    feed.publish_with(meta("app", "1.0.0", &[]), library_archive("any", "app"));
    feed.publish_with(meta("app", "2.0.0", &[]), library_archive("any", "app"));
    let installer = installer(data.path(), &feed, FakeInspector::valid("app"), SecuritySettings::default());
    let cancel = CancellationToken::new();

    assert!(installer.install("app", &v("1.0.0"), None, &cancel).await.success);
    let result = installer.install("app", &v("2.0.0"), None, &cancel).await;
    assert!(result.success, "{}", result.message);

    assert!(!data.path().join("plugins/app/1.0.0").exists());
    assert!(data.path().join("plugins/app/2.0.0").exists());
    let records = installer.list_installed().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].version, v("2.0.0"));

    assert!(installer.uninstall("app").await.success);
    assert!(!data.path().join("plugins/app").exists());
}

#[tokio::test]
async fn test_update_moves_to_latest() {
    let data = TempDir::new().unwrap();
    let feed = MockFeed::new();
    feed.publish_with(meta("app", "1.0.0", &[]), library_archive("any", "app"));
    let installer = installer(data.path(), &feed, FakeInspector::valid("app"), SecuritySettings::default());
    let cancel = CancellationToken::new();

    assert!(installer.install("app", &v("1.0.0"), None, &cancel).await.success);
    assert!(installer.check_updates().await.unwrap().is_empty());

    feed.publish_with(meta("app", "1.1.0", &[]), library_archive("any", "app"));
    feed.publish_with(meta("app", "2.0.0-beta.1", &[]), library_archive("any", "app"));

    let updates = installer.check_updates().await.unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].current_version, "1.0.0");
    assert_eq!(updates[0].latest_version, "1.1.0");

    let result = installer.update("app", None, &cancel).await;
    assert!(result.success, "{}", result.message);
    assert_eq!(result.version.as_deref(), Some("1.1.0"));
    assert!(!data.path().join("plugins/app/1.0.0").exists());
    assert!(data.path().join("plugins/app/1.1.0").exists());

    let records = installer.list_installed().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].version, v("1.1.0"));
}

#[tokio::test]
async fn test_update_when_current_is_a_no_op() {
    let data = TempDir::new().unwrap();
    let feed = MockFeed::new();
    feed.publish_with(meta("app", "1.0.0", &[]), library_archive("any", "app"));
    let installer = installer(data.path(), &feed, FakeInspector::valid("app"), SecuritySettings::default());
    let cancel = CancellationToken::new();

    assert!(installer.install("app", &v("1.0.0"), None, &cancel).await.success);
    let downloads_before = feed.downloads().len();

    let result = installer.update("app", None, &cancel).await;

    assert!(result.success);
    assert!(result.message.contains("already up to date"));
    assert_eq!(feed.downloads().len(), downloads_before);
}

#[tokio::test]
async fn test_update_unknown_plugin() {
    let data = TempDir::new().unwrap();
    let feed = MockFeed::new();
    let installer = installer(data.path(), &feed, FakeInspector::valid("app"), SecuritySettings::default());

    let result = installer.update("ghost", None, &CancellationToken::new()).await;
    assert!(!result.success);
    assert!(result.message.contains("not installed"));
}

#[tokio::test]
async fn test_validate_is_a_dry_run() {
    let data = TempDir::new().unwrap();
    let feed = widget_feed();
    let installer = installer(data.path(), &feed, FakeInspector::valid("widget"), SecuritySettings::default());

    let result = installer
        .validate("com.example.widget", &v("1.2.0"), &CancellationToken::new())
        .await;

    assert!(result.is_valid(), "{}", result.message);
    assert_eq!(result.plugin_id.as_deref(), Some("widget"));
    assert_eq!(result.dependencies.len(), 1);
    assert!(result.total_download_size > result.dependencies[0].size_bytes);
    assert!(!data.path().join("plugins").exists());
    assert!(installer.list_installed().await.unwrap().is_empty());
    assert!(file_names(&data.path().join("tmp")).is_empty());
}

#[tokio::test]
async fn test_validate_reports_policy_failure() {
    let data = TempDir::new().unwrap();
    let feed = widget_feed();
    let security = SecuritySettings {
        blocklist: vec!["lib-json".to_string()],
        ..Default::default()
    };
    let installer = installer(data.path(), &feed, FakeInspector::valid("widget"), security);

    let result = installer
        .validate("com.example.widget", &v("1.2.0"), &CancellationToken::new())
        .await;

    assert_eq!(result.status, ValidationStatus::InvalidPackage);
    assert!(result.message.contains("lib-json"));
    assert_eq!(result.dependencies.len(), 1);
}

#[tokio::test]
async fn test_concurrent_installs_are_serialized() {
    let data = TempDir::new().unwrap();
    let feed = MockFeed::new();
    for id in ["alpha", "beta", "gamma"] {
        feed.publish_with(meta(id, "1.0.0", &[("common-lib", "1.0.0")]), library_archive("any", id));
    }
    feed.publish_with(meta("common-lib", "1.0.0", &[]), library_archive("any", "common"));

    let installer = Arc::new(installer(
        data.path(),
        &feed,
        FakeInspector::valid("plugin"),
        SecuritySettings::default(),
    ));

    let tasks: Vec<_> = ["alpha", "beta", "gamma"]
        .into_iter()
        .map(|id| {
            let installer = Arc::clone(&installer);
            tokio::spawn(async move {
                installer
                    .install(id, &v("1.0.0"), None, &CancellationToken::new())
                    .await
            })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().success);
    }

    assert_eq!(feed.download_count("common-lib"), 1);
    // Every install used the same plugin id, so the last one replaced the others
    assert_eq!(installer.list_installed().await.unwrap().len(), 1);
}
