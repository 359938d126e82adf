//! Telemetry and Observability
//!
//! Handles setting up `tracing-subscriber` for structured logging.
//! Supports config-driven log levels, environment variable overrides,
//! and format switching between pretty (debug) and JSON (release).
//!
//! The CLI prints results on stdout, so log output always goes to stderr.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Crates whose debug output drowns the engine's own
const NOISY_TARGETS: &[&str] = &["hyper", "reqwest", "rustls", "h2"];

/// Filter directive for `log_level`, keeping HTTP internals at `warn`
pub fn filter_directive(log_level: &str) -> String {
    let level = log_level.trim().to_lowercase();
    let level = if level.is_empty() { "info".to_string() } else { level };

    let mut directive = format!("{},trawl_engine={}", level, level);
    for target in NOISY_TARGETS {
        directive.push_str(&format!(",{}=warn", target));
    }
    directive
}

/// Initialize the tracing subscriber with the given log level.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter > default "info".
/// Only the first call installs a subscriber.
///
/// In debug builds: pretty-printed terminal output.
/// In release builds: JSON structured output with spans.
pub fn init_telemetry_with_level(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(log_level)));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }
}

/// Pick the effective level: CLI flag, then config, then "info"
pub fn effective_level<'a>(cli_level: Option<&'a str>, config_level: &'a str) -> &'a str {
    cli_level
        .filter(|level| !level.trim().is_empty())
        .or(Some(config_level).filter(|level| !level.trim().is_empty()))
        .unwrap_or("info")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_quiets_http_stack() {
        let directive = filter_directive("DEBUG");
        assert!(directive.starts_with("debug,trawl_engine=debug"));
        assert!(directive.contains("hyper=warn"));
        assert!(directive.contains("reqwest=warn"));
        assert!(EnvFilter::try_new(&directive).is_ok());
    }

    #[test]
    fn test_filter_directive_defaults_to_info() {
        assert!(filter_directive("  ").starts_with("info,"));
    }

    #[test]
    fn test_effective_level() {
        assert_eq!(effective_level(Some("trace"), "warn"), "trace");
        assert_eq!(effective_level(None, "warn"), "warn");
        assert_eq!(effective_level(Some(""), ""), "info");
    }
}
