//! Platform-specific utilities
//!
//! Plugin packages ship native shared libraries, whose file names differ
//! per operating system:
//! - Linux: `lib{name}.so`
//! - macOS: `lib{name}.dylib`
//! - Windows: `{name}.dll`
//!
//! The installer uses these helpers to recognise binaries inside an
//! extracted package and to pick the one matching the package id.

use std::path::Path;

/// Get the platform name as a string
///
/// Returns one of: "linux", "macos", "windows", "unknown"
pub fn platform_name() -> &'static str {
    #[cfg(target_os = "linux")]
    return "linux";

    #[cfg(target_os = "macos")]
    return "macos";

    #[cfg(target_os = "windows")]
    return "windows";

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    return "unknown";
}

/// Get the platform-specific shared library extension
///
/// # Examples
///
/// ```
/// use trawl_engine::platform::library_extension;
///
/// let ext = library_extension();
///
/// #[cfg(target_os = "linux")]
/// assert_eq!(ext, "so");
///
/// #[cfg(target_os = "macos")]
/// assert_eq!(ext, "dylib");
///
/// #[cfg(target_os = "windows")]
/// assert_eq!(ext, "dll");
/// ```
pub fn library_extension() -> &'static str {
    #[cfg(target_os = "linux")]
    return "so";

    #[cfg(target_os = "macos")]
    return "dylib";

    #[cfg(target_os = "windows")]
    return "dll";

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    return "so"; // Default to .so for unknown platforms
}

/// Get the platform-specific shared library prefix
pub fn library_prefix() -> &'static str {
    #[cfg(unix)]
    return "lib";

    #[cfg(windows)]
    return "";
}

/// Construct a platform-specific library filename
///
/// # Examples
///
/// ```
/// use trawl_engine::platform::library_filename;
///
/// let filename = library_filename("page_title");
///
/// #[cfg(target_os = "linux")]
/// assert_eq!(filename, "libpage_title.so");
///
/// #[cfg(target_os = "windows")]
/// assert_eq!(filename, "page_title.dll");
/// ```
pub fn library_filename(name: &str) -> String {
    format!("{}{}.{}", library_prefix(), name, library_extension())
}

/// Whether `path` names a shared library for the current platform
pub fn is_shared_library(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(library_extension()))
}

/// Logical library name: file stem without the platform prefix
///
/// `libpage_title.so` → `page_title`
pub fn library_stem(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let prefix = library_prefix();
    let stem = if !prefix.is_empty() && stem.len() > prefix.len() {
        stem.strip_prefix(prefix).unwrap_or(stem)
    } else {
        stem
    };
    Some(stem.to_string())
}

/// Normalise a package id for comparison with a library stem
///
/// Cargo turns `-` into `_` in library names, and ids are case-insensitive.
pub fn normalize_library_name(name: &str) -> String {
    name.to_lowercase().replace(['-', '.'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_platform_name() {
        let name = platform_name();
        assert!(["linux", "macos", "windows", "unknown"].contains(&name));
    }

    #[test]
    fn test_library_filename_with_special_chars() {
        let filename = library_filename("page-title");

        #[cfg(target_os = "linux")]
        assert_eq!(filename, "libpage-title.so");

        #[cfg(target_os = "macos")]
        assert_eq!(filename, "libpage-title.dylib");

        #[cfg(target_os = "windows")]
        assert_eq!(filename, "page-title.dll");
    }

    #[test]
    fn test_is_shared_library() {
        let lib = PathBuf::from(library_filename("widget"));
        assert!(is_shared_library(&lib));
        assert!(!is_shared_library(Path::new("readme.txt")));
        assert!(!is_shared_library(Path::new("noextension")));
    }

    #[test]
    fn test_library_stem_strips_prefix() {
        let lib = PathBuf::from(library_filename("widget"));
        assert_eq!(library_stem(&lib).as_deref(), Some("widget"));
    }

    #[test]
    fn test_normalize_library_name() {
        assert_eq!(normalize_library_name("Com.Example-Widget"), "com_example_widget");
    }
}
