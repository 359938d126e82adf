//! Plugin contract shared by the host and plugin binaries
//!
//! A plugin binary is a `cdylib` built against this crate. It exports a single
//! static export table, [`PluginExports`], under the symbol named by
//! [`EXPORTS_SYMBOL`]. The host reads the table, asks it to enumerate the types
//! the binary provides, and instantiates the first concrete type that carries a
//! [`PluginDeclaration`].
//!
//! The [`export_plugins!`](crate::export_plugins) macro writes the table for you:
//!
//! ```ignore
//! use sdk::{DeclaredPlugin, Plugin, PluginDeclaration, PluginError};
//!
//! pub struct PageTitle;
//!
//! impl Plugin for PageTitle {
//!     fn id(&self) -> &str { "page-title" }
//!     fn name(&self) -> &str { "Page Title Extractor" }
//!     fn version(&self) -> &str { env!("CARGO_PKG_VERSION") }
//! }
//!
//! impl DeclaredPlugin for PageTitle {
//!     const DECLARATION: Option<PluginDeclaration> = Some(PluginDeclaration {
//!         id: "page-title",
//!         name: "Page Title Extractor",
//!         min_host_version: "0.1.0",
//!     });
//!
//!     fn create() -> Result<Self, PluginError> {
//!         Ok(PageTitle)
//!     }
//! }
//!
//! sdk::export_plugins!(PageTitle);
//! ```
//!
//! Host and plugin must be built with the same compiler: the table and the
//! trait objects it hands out use the Rust ABI.

use crate::errors::PluginError;

/// Version of the export table layout. Bumped on any breaking change to
/// [`PluginExports`], [`ExportedType`] or [`Plugin`].
pub const PLUGIN_ABI_VERSION: u32 = 1;

/// Symbol under which a plugin binary exports its [`PluginExports`] table
pub const EXPORTS_SYMBOL: &[u8] = b"TRAWL_PLUGIN_EXPORTS\0";

/// Trait that all plugins must implement
pub trait Plugin: Send + Sync {
    /// Stable plugin identifier
    fn id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str;

    /// Plugin version (semantic version)
    fn version(&self) -> &str;

    /// Short description shown in listings
    fn description(&self) -> &str {
        ""
    }
}

/// Declaration marker a plugin type must carry to be accepted by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginDeclaration {
    /// Plugin identifier as declared by the author
    pub id: &'static str,
    /// Display name as declared by the author
    pub name: &'static str,
    /// Oldest host version this plugin runs on
    pub min_host_version: &'static str,
}

/// Constructor for a concrete plugin type
pub type PluginFactory = fn() -> Result<Box<dyn Plugin>, PluginError>;

/// One type exported by a plugin binary
///
/// A type without a `factory` cannot be instantiated (an abstract base,
/// a helper) and is never considered a plugin candidate.
#[derive(Clone, Copy)]
pub struct ExportedType {
    /// Fully qualified type name, for diagnostics
    pub type_name: &'static str,
    /// Declaration marker, if the type carries one
    pub declaration: Option<PluginDeclaration>,
    /// Constructor, if the type is concrete
    pub factory: Option<PluginFactory>,
}

impl ExportedType {
    /// Describe a concrete plugin type
    pub fn of<T: DeclaredPlugin>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            declaration: T::DECLARATION,
            factory: Some(create_boxed::<T>),
        }
    }

    /// Describe a type that implements part of the contract but cannot be
    /// instantiated on its own
    pub fn abstract_type(type_name: &'static str) -> Self {
        Self {
            type_name,
            declaration: None,
            factory: None,
        }
    }

    /// Whether the host may instantiate this type
    pub fn is_concrete(&self) -> bool {
        self.factory.is_some()
    }
}

impl std::fmt::Debug for ExportedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportedType")
            .field("type_name", &self.type_name)
            .field("declaration", &self.declaration)
            .field("concrete", &self.is_concrete())
            .finish()
    }
}

fn create_boxed<T: DeclaredPlugin>() -> Result<Box<dyn Plugin>, PluginError> {
    T::create().map(|plugin| Box::new(plugin) as Box<dyn Plugin>)
}

/// A plugin type that knows how to declare and construct itself
pub trait DeclaredPlugin: Plugin + Sized + 'static {
    /// Declaration marker, `None` for undeclared types
    const DECLARATION: Option<PluginDeclaration>;

    /// Construct an instance
    fn create() -> Result<Self, PluginError>;
}

/// Receives the types a plugin binary exports
pub trait PluginRegistrar {
    fn register(&mut self, exported: ExportedType);
}

impl PluginRegistrar for Vec<ExportedType> {
    fn register(&mut self, exported: ExportedType) {
        self.push(exported);
    }
}

/// Export table every plugin binary provides under [`EXPORTS_SYMBOL`]
#[repr(C)]
pub struct PluginExports {
    /// Must equal [`PLUGIN_ABI_VERSION`]
    pub abi_version: u32,
    /// Version of the SDK the plugin was built against
    pub sdk_version: &'static str,
    /// Enumerates the exported types in declaration order
    pub register: fn(&mut dyn PluginRegistrar),
}

impl PluginExports {
    /// Collect every exported type
    pub fn exported_types(&self) -> Vec<ExportedType> {
        let mut types = Vec::new();
        (self.register)(&mut types);
        types
    }
}

/// Write the [`PluginExports`] table for the listed types
///
/// Types are registered in the order given; the host picks the first
/// concrete one.
#[macro_export]
macro_rules! export_plugins {
    ($($plugin:ty),+ $(,)?) => {
        #[no_mangle]
        pub static TRAWL_PLUGIN_EXPORTS: $crate::plugin::PluginExports =
            $crate::plugin::PluginExports {
                abi_version: $crate::plugin::PLUGIN_ABI_VERSION,
                sdk_version: $crate::SDK_VERSION,
                register: __trawl_register_exported_types,
            };

        fn __trawl_register_exported_types(registrar: &mut dyn $crate::plugin::PluginRegistrar) {
            $(
                registrar.register($crate::plugin::ExportedType::of::<$plugin>());
            )+
        }
    };
}
