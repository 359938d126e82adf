//! Error types and handling
//!
//! This module provides the error types used throughout the Trawl plugin engine.
//! All engine errors implement the `TrawlErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! User hints never contain:
//! - Feed credentials or tokens embedded in URLs
//! - Absolute file paths
//! - Internal implementation details

use thiserror::Error;

/// Trait for Trawl error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait TrawlErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried (another feed, a later attempt).
    /// Non-recoverable errors require the package or the policy to change.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Feed**: a feed was unreachable or answered with an error
/// - **Resolution**: the dependency graph could not be resolved
/// - **Security**: the security policy rejected a package
/// - **Inspection**: a candidate binary failed contract validation
/// - **I/O**: download, extraction and copy failures
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, TrawlErrorExt};
///
/// let error = EngineError::Feed("connection refused".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::SecurityViolation("Evil.Plugin is blocklisted".to_string());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Feed errors
    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("Invalid version '{0}'")]
    InvalidVersion(String),

    // Resolution errors
    #[error("Dependency resolution failed: {0}")]
    Resolution(String),

    // Security errors
    #[error("Security policy violation: {0}")]
    SecurityViolation(String),

    #[error("Package too large: {size} bytes > {limit} bytes")]
    PackageTooLarge { size: u64, limit: u64 },

    #[error("Hash mismatch: {0}")]
    HashMismatch(String),

    // Inspection errors
    #[error("Plugin inspection failed: {0}")]
    Inspection(String),

    #[error("Library load failed: {0}")]
    LibraryLoadFailed(String),

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    // Installation errors
    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Plugin not installed: {0}")]
    PluginNotInstalled(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrawlErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml and security.toml files for errors",

            Self::Feed(_) => "Package feed unavailable. Check the configured feeds",
            Self::Network(_) => "Network operation failed. Check your connection",
            Self::PackageNotFound(_) => "No configured feed offers this package",
            Self::InvalidVersion(_) => "Use a semantic version such as 1.2.0",

            Self::Resolution(_) => "Dependencies could not be resolved. Try another version",

            Self::SecurityViolation(_) => "The package was rejected by the security policy",
            Self::PackageTooLarge { .. } => "Package exceeds the configured size limit",
            Self::HashMismatch(_) => "Downloaded package is corrupted or was tampered with",

            Self::Inspection(_) => "The package does not contain a usable plugin",
            Self::LibraryLoadFailed(_) => "The plugin binary could not be loaded",
            Self::SymbolNotFound(_) => "The plugin binary was not built with the Trawl SDK",

            Self::Extraction(_) => "Package archive could not be extracted",
            Self::PluginNotInstalled(_) => "The plugin is not installed",
            Self::Cancelled => "The operation was cancelled",
            Self::Serialization(_) => "Stored plugin metadata is unreadable",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::SecurityViolation(_)
            | Self::PackageTooLarge { .. }
            | Self::HashMismatch(_)
            | Self::LibraryLoadFailed(_)
            | Self::SymbolNotFound(_)
            | Self::Inspection(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}

/// Errors a plugin reports back to the host while being constructed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PluginError {
    #[error("Plugin initialization failed: {0}")]
    Initialization(String),

    #[error("Unsupported host: {0}")]
    UnsupportedHost(String),
}
