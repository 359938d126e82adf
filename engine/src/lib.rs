//! Trawl Engine Library
//!
//! Resolves, validates and installs plugin packages for a host application.
//! It is used by both the `trawl` binary and integration tests.

/// Configuration management module
pub mod config;

/// Package identities, versions and target environments
pub mod package;

/// Package feed clients
pub mod feed;

/// Process-wide registry of extracted dependencies
pub mod cache;

/// Dependency graph resolution
pub mod resolver;

/// Security policy checks
pub mod security;

/// Isolated inspection of candidate plugin binaries
pub mod inspector;

/// Installed plugin metadata
pub mod store;

/// Install, uninstall and update orchestration
pub mod installer;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;

/// Platform-specific utilities module
pub mod platform;
