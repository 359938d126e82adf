//! Trawl SDK
//!
//! Shared library providing the plugin contract and error types for Trawl.
//! This crate is used by both the engine and plugin binaries.

/// Error types and handling
pub mod errors;

/// Plugin trait, declaration marker and export table
pub mod plugin;

/// Version of this SDK, compared against a plugin's declared minimum host version
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export commonly used types
pub use errors::{EngineError, PluginError, TrawlErrorExt};
pub use plugin::{
    DeclaredPlugin, ExportedType, Plugin, PluginDeclaration, PluginExports, PluginFactory,
    PluginRegistrar, EXPORTS_SYMBOL, PLUGIN_ABI_VERSION,
};
