//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - install / uninstall / update: change the set of installed plugins
//! - list / check-updates: report on installed plugins
//! - validate / resolve: dry runs against the feeds
//! - cache: extracted dependencies and host-provided modules
//! - doctor: validate configuration and show engine paths
//!
//! Results go to stdout; logs go to stderr.

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cache::{DependencyCache, ProcessModules};
use crate::config::{Config, SecuritySettings};
use crate::feed::FeedSet;
use crate::installer::{progress_channel, InstallResult, PackageInstaller};
use crate::package::parse_version;
use crate::platform;
use semver::Version;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Build the installer and everything it depends on from `config`
pub fn build_installer(config: &Config) -> Result<PackageInstaller> {
    let security = SecuritySettings::load_or_create(&config.security_path())
        .context("Failed to load security settings")?;
    let feeds = FeedSet::from_config(&config.feeds).context("Failed to set up package feeds")?;

    let mut modules = ProcessModules::default();
    if let Some(manifest) = &config.host.module_manifest {
        modules = modules.with_manifest(manifest);
    }
    let cache = Arc::new(DependencyCache::with_source(modules));

    Ok(PackageInstaller::new(config, feeds, cache, security)?)
}

/// Parse `requested`, or ask the feeds for the latest stable version
async fn pick_version(
    installer: &PackageInstaller,
    package_id: &str,
    requested: Option<String>,
) -> Result<Version> {
    match requested {
        Some(version) => Ok(parse_version(&version)?),
        None => installer
            .latest_version(package_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No published version of {} found", package_id)),
    }
}

/// Token cancelled when the user presses Ctrl+C
fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            child.cancel();
        }
    });
    token
}

fn print_install_result(result: &InstallResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            if result.success {
                println!("✓ {}", result.message);
            }
            for warning in &result.warnings {
                println!("  warning: {}", warning);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
    }

    if result.success {
        Ok(())
    } else {
        Err(anyhow::anyhow!("{}", result.message))
    }
}

/// Install a package
pub async fn handle_install(
    package_id: String,
    version: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let installer = build_installer(config)?;
    let version = pick_version(&installer, &package_id, version).await?;
    let cancel = cancel_on_interrupt();

    let (progress, mut updates) = progress_channel();
    let printer = matches!(format, OutputFormat::Text).then(|| {
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let update = updates.borrow_and_update().clone();
                eprintln!("[{:>3}%] {}", update.percent_complete, update.status);
            }
        })
    });

    let result = installer
        .install(&package_id, &version, Some(progress), &cancel)
        .await;
    if let Some(printer) = printer {
        printer.await.ok();
    }

    print_install_result(&result, format)
}

/// Uninstall a plugin
pub async fn handle_uninstall(plugin_id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let installer = build_installer(config)?;
    let result = installer.uninstall(&plugin_id).await;
    print_install_result(&result, format)
}

/// Update a plugin to the latest version
pub async fn handle_update(plugin_id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let installer = build_installer(config)?;
    let cancel = cancel_on_interrupt();
    let result = installer.update(&plugin_id, None, &cancel).await;
    print_install_result(&result, format)
}

/// List installed plugins
pub async fn handle_list(config: &Config, format: OutputFormat) -> Result<()> {
    let installer = build_installer(config)?;
    let records = installer.list_installed().await?;

    match format {
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No plugins installed.");
                return Ok(());
            }
            println!("Installed Plugins:");
            println!();
            for record in &records {
                println!(
                    "  {} {} ({})",
                    record.plugin_id, record.version, record.plugin_name
                );
                println!("    package:      {}", record.package_id);
                println!("    dependencies: {}", record.dependencies.len());
                println!(
                    "    installed:    {}",
                    record.install_date_utc.format("%Y-%m-%d %H:%M UTC")
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ "plugins": records }))?);
        }
    }

    Ok(())
}

/// Show plugins with updates available
pub async fn handle_check_updates(config: &Config, format: OutputFormat) -> Result<()> {
    let installer = build_installer(config)?;
    let updates = installer.check_updates().await?;

    match format {
        OutputFormat::Text => {
            if updates.is_empty() {
                println!("All plugins are up to date.");
            }
            for update in &updates {
                println!(
                    "  {}: {} -> {}",
                    update.plugin_id, update.current_version, update.latest_version
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ "updates": updates }))?);
        }
    }

    Ok(())
}

/// Dry-run an install
pub async fn handle_validate(
    package_id: String,
    version: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let installer = build_installer(config)?;
    let version = pick_version(&installer, &package_id, version).await?;
    let cancel = cancel_on_interrupt();
    let result = installer.validate(&package_id, &version, &cancel).await;

    match format {
        OutputFormat::Text => {
            println!("{} {}: {}", package_id, version, result.status);
            println!("  {}", result.message);
            if let Some(id) = &result.plugin_id {
                println!("  plugin:        {}", id);
            }
            if let Some(required) = &result.min_required_sdk_version {
                println!("  requires host: {}", required);
            }
            println!("  dependencies:  {}", result.dependencies.len());
            println!("  download size: {} bytes", result.total_download_size);
            for warning in &result.security_warnings {
                println!("  warning: {}", warning);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

/// Print the resolved dependency graph
pub async fn handle_resolve(
    package_id: String,
    version: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let installer = build_installer(config)?;
    let version = pick_version(&installer, &package_id, version).await?;
    let cancel = cancel_on_interrupt();
    let resolution = installer.resolve(&package_id, &version, &cancel).await;

    match format {
        OutputFormat::Text => {
            if !resolution.success {
                anyhow::bail!(
                    "{}",
                    resolution
                        .error_message
                        .unwrap_or_else(|| "Resolution failed".to_string())
                );
            }
            println!(
                "{} {} for {}",
                package_id,
                version,
                installer.target_environment()
            );
            for dep in &resolution.dependencies {
                println!(
                    "{}{} {} ({})",
                    "  ".repeat(dep.depth),
                    dep.package_id,
                    dep.version,
                    dep.version_range
                );
            }
            if resolution.has_circular_dependency {
                println!("(circular dependency detected)");
            }
            for warning in &resolution.warnings {
                println!("  warning: {}", warning);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&resolution)?);
        }
    }

    Ok(())
}

/// Show cache and host module state
pub async fn handle_cache(config: &Config, format: OutputFormat) -> Result<()> {
    let installer = build_installer(config)?;
    let cache = installer.cache();
    let entries = cache.entries();
    let modules = cache.host_modules();

    match format {
        OutputFormat::Text => {
            println!("Extracted dependencies ({}):", entries.len());
            for entry in &entries {
                println!("  {} -> {}", entry.key, entry.path.display());
            }
            println!();
            println!("Host modules ({}):", modules.len());
            for module in modules {
                match &module.version {
                    Some(version) => println!("  {} {}", module.name, version),
                    None => println!("  {}", module.name),
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "entries": entries.iter().map(|e| json!({
                    "key": e.key,
                    "path": e.path,
                })).collect::<Vec<_>>(),
                "host_modules": modules.iter().map(|m| json!({
                    "name": m.name,
                    "version": m.version.as_ref().map(|v| v.to_string()),
                })).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Run configuration diagnostics
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks: Vec<(&str, String)> = Vec::new();

    // Config is already validated when loaded
    checks.push(("Configuration", "Valid".to_string()));
    checks.push(("Data directory", config.core.data_dir.display().to_string()));
    checks.push(("Platform", platform::platform_name().to_string()));

    match config.target_environment() {
        Ok(target) => checks.push(("Target environment", target.to_string())),
        Err(e) => {
            checks.push(("Target environment", "Invalid".to_string()));
            issues.push(e.to_string());
        }
    }

    match SecuritySettings::load_or_create(&config.security_path()) {
        Ok(settings) => {
            checks.push((
                "Security policy",
                format!(
                    "{} allowed, {} blocked, depth {}",
                    settings.allowlist.len(),
                    settings.blocklist.len(),
                    settings.max_dependency_depth
                ),
            ));
            if !settings.allow_untrusted_feeds && settings.trusted_feeds.is_empty() {
                issues.push(
                    "Untrusted feeds are disallowed but no trusted feeds are listed".to_string(),
                );
            }
        }
        Err(e) => {
            checks.push(("Security policy", "Unreadable".to_string()));
            issues.push(format!("Cannot load security settings: {}", e));
        }
    }

    if config.feeds.sources.is_empty() {
        checks.push(("Feeds", "None configured".to_string()));
        issues.push("No package feeds configured in config.toml".to_string());
    } else {
        checks.push(("Feeds", config.feeds.sources.join(", ")));
    }

    if let Some(manifest) = &config.host.module_manifest {
        if manifest.exists() {
            checks.push(("Module manifest", "Exists".to_string()));
        } else {
            checks.push(("Module manifest", "Missing".to_string()));
            issues.push(format!("Module manifest does not exist: {:?}", manifest));
        }
    }

    match format {
        OutputFormat::Text => {
            println!("Trawl Diagnostics");
            println!("=================");
            println!();
            for (check, status) in &checks {
                println!("  {:<20} {}", format!("{}:", check), status);
            }
            println!();

            if issues.is_empty() {
                println!("✓ All checks passed!");
            } else {
                println!("⚠ Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({
                        "name": name,
                        "status": status
                    })
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
