//! Package identities, versions, version ranges and target environments
//!
//! These are the value types shared by the feed client, the resolver and the
//! installer. Package ids are case-insensitive everywhere.

mod environment;
mod identity;
mod metadata;
pub mod version;

pub use environment::TargetEnvironment;
pub use identity::PackageIdentity;
pub use metadata::{DependencyGroup, PackageDependency, PackageIndex, PackageMetadata};
pub use version::{parse_version, VersionRange};
