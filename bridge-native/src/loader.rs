//! Locating `libuplink` on disk.
//!
//! Candidates are tried in a fixed order and the first one that opens wins:
//!
//! 1. the explicit path (configuration, else `UPLINK_LIBRARY_PATH`)
//! 2. `native/prebuilds/<platform>/libuplink.<ext>`
//! 3. `prebuilds/<platform>/libuplink.<ext>`
//! 4. `libuplink.<ext>` through the system loader path
//!
//! The outcome, success or failure, is cached by the [`LibraryLoader`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use bridge_traits::ForeignLibrary;
use tracing::{debug, error, info};

use crate::dynamic::DynamicUplink;
use crate::error::{Attempt, LoadError, Result};

pub const ENV_LIBRARY_PATH: &str = "UPLINK_LIBRARY_PATH";

/// Opens one candidate path. The seam exists so the search order can be
/// tested without shared objects on disk.
pub trait LibraryOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Arc<dyn ForeignLibrary>>;
}

/// Opens candidates with [`DynamicUplink::open`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOpener;

impl LibraryOpener for SystemOpener {
    fn open(&self, path: &Path) -> Result<Arc<dyn ForeignLibrary>> {
        Ok(Arc::new(DynamicUplink::open(path)?))
    }
}

/// Directory name of the bundled build for the running platform.
pub fn platform_dir() -> &'static str {
    match (std::env::consts::OS, std::env::consts::ARCH) {
        ("windows", "x86_64") => "win32-x64",
        ("windows", _) => "win32-ia32",
        ("macos", "aarch64") => "darwin-arm64",
        ("macos", _) => "darwin-x64",
        (_, "aarch64") => "linux-arm64",
        _ => "linux-x64",
    }
}

/// `libuplink.so`, `libuplink.dylib` or `libuplink.dll`.
pub fn library_file_name() -> String {
    format!("libuplink{}", std::env::consts::DLL_SUFFIX)
}

/// A successfully opened library and where it came from.
#[derive(Clone)]
pub struct LoadedLibrary {
    pub path: PathBuf,
    pub library: Arc<dyn ForeignLibrary>,
}

impl std::fmt::Debug for LoadedLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedLibrary")
            .field("path", &self.path)
            .field("library", &self.library.describe())
            .finish()
    }
}

pub struct LibraryLoader<O = SystemOpener> {
    explicit: Option<PathBuf>,
    opener: O,
    outcome: OnceLock<Result<LoadedLibrary>>,
}

impl LibraryLoader<SystemOpener> {
    /// `explicit` takes priority; when it is `None` the loader falls back to
    /// `UPLINK_LIBRARY_PATH`.
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self::with_opener(explicit, SystemOpener)
    }
}

impl<O: LibraryOpener> LibraryLoader<O> {
    pub fn with_opener(explicit: Option<PathBuf>, opener: O) -> Self {
        let explicit = explicit.or_else(|| {
            std::env::var_os(ENV_LIBRARY_PATH)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        });

        Self {
            explicit,
            opener,
            outcome: OnceLock::new(),
        }
    }

    /// Every location that will be tried, in order.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let file = library_file_name();
        let platform = platform_dir();

        let mut candidates = Vec::with_capacity(4);
        if let Some(path) = &self.explicit {
            candidates.push(path.clone());
        }
        candidates.push(
            Path::new("native")
                .join("prebuilds")
                .join(platform)
                .join(&file),
        );
        candidates.push(Path::new("prebuilds").join(platform).join(&file));
        candidates.push(PathBuf::from(file));
        candidates
    }

    /// Returns the cached outcome, searching on first use.
    pub fn load(&self) -> Result<LoadedLibrary> {
        self.outcome.get_or_init(|| self.search()).clone()
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.outcome.get(), Some(Ok(_)))
    }

    /// Path the library was loaded from, if loading has succeeded.
    pub fn loaded_path(&self) -> Option<&Path> {
        match self.outcome.get() {
            Some(Ok(loaded)) => Some(&loaded.path),
            _ => None,
        }
    }

    fn search(&self) -> Result<LoadedLibrary> {
        let mut attempts = Vec::new();

        for path in self.candidates() {
            debug!(path = %path.display(), "Attempting to load libuplink");

            match self.opener.open(&path) {
                Ok(library) => {
                    info!(path = %path.display(), "libuplink available");
                    return Ok(LoadedLibrary { path, library });
                }
                // The file exists but is not a usable libuplink; later
                // candidates would only mask the broken install.
                Err(err @ LoadError::MissingSymbol { .. }) => {
                    error!(error = %err, "Rejected incompatible libuplink");
                    return Err(err);
                }
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "Candidate failed");
                    attempts.push(Attempt {
                        path,
                        reason: err.to_string(),
                    });
                }
            }
        }

        error!(attempts = attempts.len(), "Failed to load libuplink from any location");
        Err(LoadError::NotFound { attempts })
    }
}
