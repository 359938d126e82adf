//! Isolated, revocable load scope for a candidate plugin binary
//!
//! The scope is the only owner of the loaded library. Everything read from
//! the library is copied into owned values before it leaves the scope, so once
//! the scope is unloaded nothing in the engine can reach the module.

use libloading::Library;
use sdk::errors::EngineError;
use sdk::plugin::{PluginExports, EXPORTS_SYMBOL};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, warn};

static LIVE_SCOPES: AtomicUsize = AtomicUsize::new(0);

pub struct IsolatedScope {
    library: Option<Arc<Library>>,
    path: PathBuf,
}

impl IsolatedScope {
    /// Load `path` without exposing its symbols to the rest of the process
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let library = open_local(path).map_err(|e| {
            warn!("Failed to load {}: {}", path.display(), e);
            EngineError::LibraryLoadFailed(e.to_string())
        })?;

        LIVE_SCOPES.fetch_add(1, Ordering::SeqCst);
        debug!("Opened isolated scope for {}", path.display());

        Ok(Self {
            library: Some(Arc::new(library)),
            path: path.to_path_buf(),
        })
    }

    /// The plugin export table, borrowed for the lifetime of the scope
    pub fn exports(&self) -> Result<&PluginExports, EngineError> {
        let library = self
            .library
            .as_ref()
            .ok_or_else(|| EngineError::Inspection("scope already unloaded".to_string()))?;

        // SAFETY: the symbol is a `PluginExports` static written by
        // `export_plugins!`; the returned reference cannot outlive `self`,
        // which keeps the library mapped.
        unsafe {
            let symbol: libloading::Symbol<*const PluginExports> =
                library.get(EXPORTS_SYMBOL).map_err(|e| EngineError::SymbolNotFound(e.to_string()))?;
            let exports: *const PluginExports = *symbol;
            exports
                .as_ref()
                .ok_or_else(|| EngineError::SymbolNotFound("null export table".to_string()))
        }
    }

    /// Release the library and return a liveness handle for it
    pub fn unload(mut self) -> Weak<Library> {
        self.release()
    }

    fn release(&mut self) -> Weak<Library> {
        let Some(library) = self.library.take() else {
            return Weak::new();
        };
        let liveness = Arc::downgrade(&library);

        match Arc::try_unwrap(library) {
            Ok(library) => {
                if let Err(e) = library.close() {
                    warn!("Closing {} failed: {}", self.path.display(), e);
                }
            }
            Err(shared) => {
                warn!("{} is still referenced at unload", self.path.display());
                drop(shared);
            }
        }

        LIVE_SCOPES.fetch_sub(1, Ordering::SeqCst);
        debug!("Closed isolated scope for {}", self.path.display());
        liveness
    }

    /// Number of scopes currently holding a library
    pub fn live_count() -> usize {
        LIVE_SCOPES.load(Ordering::SeqCst)
    }
}

impl Drop for IsolatedScope {
    fn drop(&mut self) {
        if self.library.is_some() {
            self.release();
        }
    }
}

#[cfg(unix)]
fn open_local(path: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LOCAL, RTLD_NOW};

    // SAFETY: loading runs the library's initialisers; candidates are only
    // inspected after passing the security policy.
    unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL).map(Library::from) }
}

#[cfg(not(unix))]
fn open_local(path: &Path) -> Result<Library, libloading::Error> {
    // SAFETY: see the unix variant
    unsafe { Library::new(path) }
}

/// Poll until the library behind `liveness` is gone from the process
///
/// Best effort: the platform loader may keep a module mapped (for example
/// when it registered thread-local destructors).
pub fn confirm_reclaimed(liveness: &Weak<Library>, path: &Path, attempts: u32, interval: Duration) -> bool {
    for attempt in 1..=attempts {
        if liveness.upgrade().is_none() && !is_mapped(path) {
            debug!("{} reclaimed after {} check(s)", path.display(), attempt);
            return true;
        }
        if attempt < attempts {
            std::thread::sleep(interval);
        }
    }
    warn!("{} still resident after {} check(s)", path.display(), attempts);
    false
}

#[cfg(target_os = "linux")]
fn is_mapped(path: &Path) -> bool {
    let Ok(canonical) = path.canonicalize() else {
        return false;
    };
    let Some(needle) = canonical.to_str() else {
        return false;
    };
    std::fs::read_to_string("/proc/self/maps")
        .map(|maps| maps.lines().any(|line| line.ends_with(needle)))
        .unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
fn is_mapped(_path: &Path) -> bool {
    false
}
