// Trawl plugin package manager
// Main entry point for the trawl binary

use clap::Parser;
use trawl_engine::cli::{Cli, Command};
use trawl_engine::config::Config;
use trawl_engine::handlers::{
    handle_cache, handle_check_updates, handle_doctor, handle_install, handle_list, handle_resolve,
    handle_uninstall, handle_update, handle_validate, OutputFormat,
};
use trawl_engine::telemetry::{effective_level, init_telemetry_with_level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // RUST_LOG still wins over both
    init_telemetry_with_level(effective_level(cli.log.as_deref(), &config.core.log_level));

    tracing::debug!(
        "Trawl v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    match cli.command {
        Command::Install {
            package_id,
            version,
        } => {
            tracing::info!("Installing {}", package_id);
            handle_install(package_id, version, &config, format).await
        }

        Command::Uninstall { plugin_id } => {
            tracing::info!("Uninstalling {}", plugin_id);
            handle_uninstall(plugin_id, &config, format).await
        }

        Command::Update { plugin_id } => {
            tracing::info!("Updating {}", plugin_id);
            handle_update(plugin_id, &config, format).await
        }

        Command::List => handle_list(&config, format).await,

        Command::CheckUpdates => handle_check_updates(&config, format).await,

        Command::Validate {
            package_id,
            version,
        } => handle_validate(package_id, version, &config, format).await,

        Command::Resolve {
            package_id,
            version,
        } => handle_resolve(package_id, version, &config, format).await,

        Command::Cache => handle_cache(&config, format).await,

        Command::Doctor => handle_doctor(&config, format).await,
    }
}
