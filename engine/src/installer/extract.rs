//! Archive extraction and binary placement
//!
//! Everything here is blocking file system work; the installer runs it on
//! `spawn_blocking`.

use crate::package::TargetEnvironment;
use crate::platform;
use sdk::errors::EngineError;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Written into a shared package directory once extraction has completed
pub const EXTRACTED_MARKER: &str = ".trawl-extracted";

/// Extract a zip archive into `dest`, returning the number of files written
///
/// Entries escaping `dest` are skipped.
pub fn extract_zip(archive_path: &Path, dest: &Path) -> Result<usize, EngineError> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| EngineError::Extraction(format!("{}: {}", archive_path.display(), e)))?;

    fs::create_dir_all(dest)?;
    let mut written = 0;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| EngineError::Extraction(format!("entry {}: {}", i, e)))?;

        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping unsafe archive entry {}", entry.name());
            continue;
        };
        if relative.to_string_lossy().contains("__MACOSX") {
            continue;
        }
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out_file)?;
        written += 1;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&out_path, fs::Permissions::from_mode(mode))?;
            }
        }
    }

    debug!("Extracted {} file(s) from {}", written, archive_path.display());
    Ok(written)
}

/// Remove `dir` if present and recreate it empty
pub fn reset_dir(dir: &Path) -> Result<(), EngineError> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    Ok(())
}

/// Extract `archive_path` into a fresh `dest` and mark it complete
pub fn extract_fresh(archive_path: &Path, dest: &Path) -> Result<usize, EngineError> {
    reset_dir(dest)?;
    let written = extract_zip(archive_path, dest)?;
    fs::write(dest.join(EXTRACTED_MARKER), b"")?;
    Ok(written)
}

pub fn is_extracted(dir: &Path) -> bool {
    dir.join(EXTRACTED_MARKER).is_file()
}

/// Folder holding the binaries best suited to `target`
///
/// Looks for `lib/<environment>/` folders and picks the nearest compatible
/// one. Falls back to `lib/` itself, then to the package root.
pub fn select_library_dir(package_root: &Path, target: &TargetEnvironment) -> PathBuf {
    let lib = package_root.join("lib");
    if !lib.is_dir() {
        return package_root.to_path_buf();
    }

    let folders: Vec<(TargetEnvironment, PathBuf)> = fs::read_dir(&lib)
        .map(|entries| {
            entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.is_dir())
                .filter_map(|path| {
                    let name = path.file_name()?.to_str()?;
                    let env = TargetEnvironment::parse(name).ok()?;
                    Some((env, path))
                })
                .collect()
        })
        .unwrap_or_default();

    match TargetEnvironment::select_nearest(target, &folders, |(env, _)| env) {
        Some((env, path)) => {
            debug!("Selected {} binaries in {}", env, path.display());
            path.clone()
        }
        None => {
            debug!("No binaries for {} in {}, using raw folder", target, lib.display());
            lib
        }
    }
}

/// Shared libraries directly inside `dir`, sorted by name
pub fn find_libraries(dir: &Path) -> Vec<PathBuf> {
    let mut libraries: Vec<PathBuf> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.is_file() && platform::is_shared_library(path))
                .collect()
        })
        .unwrap_or_default();
    libraries.sort();
    libraries
}

/// The library named after `package_id`, else the first library
///
/// Matches the full id or its last dotted segment, so `com.example.widget`
/// finds `libwidget.so`.
pub fn select_candidate(libraries: &[PathBuf], package_id: &str) -> Option<PathBuf> {
    let full = platform::normalize_library_name(package_id);
    let short = package_id
        .rsplit('.')
        .next()
        .map(platform::normalize_library_name)
        .unwrap_or_else(|| full.clone());

    libraries
        .iter()
        .find(|path| {
            platform::library_stem(path)
                .map(|stem| {
                    let stem = platform::normalize_library_name(&stem);
                    stem == full || stem == short
                })
                .unwrap_or(false)
        })
        .or_else(|| libraries.first())
        .cloned()
}

/// Copy every file of `from` into `to`, keeping files already present
///
/// Returns the number of files copied.
pub fn copy_binaries(from: &Path, to: &Path) -> Result<usize, EngineError> {
    fs::create_dir_all(to)?;
    let mut copied = 0;

    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let source = entry.path();
        if !source.is_file() || entry.file_name() == EXTRACTED_MARKER {
            continue;
        }

        let target = to.join(entry.file_name());
        if target.exists() {
            debug!("Keeping existing {}", target.display());
            continue;
        }

        fs::copy(&source, &target)?;
        copied += 1;
    }

    Ok(copied)
}

/// Remove `dir` if it exists and is empty
pub fn remove_if_empty(dir: &Path) {
    let is_empty = fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false);
    if is_empty {
        if let Err(e) = fs::remove_dir(dir) {
            debug!("Could not remove {}: {}", dir.display(), e);
        }
    }
}
