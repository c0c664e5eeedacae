use std::path::{Path, PathBuf};

use ironscan_twain::DsmEntry;

/// Name of the single function exported by every data source manager.
const ENTRY_SYMBOL: &[u8] = b"DSM_Entry\0";

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("failed to load data source manager library {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("`DSM_Entry` is not exported by {}", path.display())]
    MissingEntry {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("no data source manager library available (tried {candidates:?})")]
    NotFound { candidates: Vec<PathBuf> },
}

/// Loads the data source manager and resolves its dispatch entry point.
pub trait DsmLibrary: Send + Sync {
    /// Loads the library.
    ///
    /// `prefer_legacy` selects the old `TWAIN_32.dll` manager on 32-bit Windows and is ignored
    /// everywhere else. A failed load leaves nothing behind.
    fn load(&mut self, prefer_legacy: bool) -> Result<(), LibraryError>;

    /// Returns the dispatch entry point of the loaded library, if any.
    fn resolve(&self) -> Option<DsmEntry>;

    /// Releases the library. Calling it on an unloaded library does nothing.
    fn unload(&mut self);

    fn is_loaded(&self) -> bool;
}

/// The data source manager installed on the system, loaded with `libloading`.
#[derive(Debug, Default)]
pub struct NativeDsmLibrary {
    path_override: Option<PathBuf>,
    loaded: Option<(PathBuf, libloading::Library)>,
}

impl NativeDsmLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the manager from `path` instead of the platform default locations.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path_override: Some(path.into()),
            loaded: None,
        }
    }

    pub fn loaded_path(&self) -> Option<&Path> {
        self.loaded.as_ref().map(|(path, _)| path.as_path())
    }

    fn candidates(&self, prefer_legacy: bool) -> Vec<PathBuf> {
        if let Some(path) = &self.path_override {
            return vec![path.clone()];
        }

        default_candidates(prefer_legacy)
            .iter()
            .map(PathBuf::from)
            .collect()
    }
}

#[cfg(windows)]
fn default_candidates(prefer_legacy: bool) -> &'static [&'static str] {
    if prefer_legacy && cfg!(target_pointer_width = "32") {
        &["TWAIN_32.dll", "TWAINDSM.dll"]
    } else {
        &["TWAINDSM.dll"]
    }
}

#[cfg(target_os = "macos")]
fn default_candidates(_prefer_legacy: bool) -> &'static [&'static str] {
    &[
        "/Library/Frameworks/TWAINDSM.framework/TWAINDSM",
        "/System/Library/Frameworks/TWAIN.framework/TWAIN",
    ]
}

#[cfg(not(any(windows, target_os = "macos")))]
fn default_candidates(_prefer_legacy: bool) -> &'static [&'static str] {
    &["libtwaindsm.so.2", "libtwaindsm.so"]
}

impl DsmLibrary for NativeDsmLibrary {
    fn load(&mut self, prefer_legacy: bool) -> Result<(), LibraryError> {
        if self.loaded.is_some() {
            return Ok(());
        }

        let candidates = self.candidates(prefer_legacy);
        let mut last_error = None;

        for path in &candidates {
            // SAFETY: loading a data source manager runs its initialisation routines, which have no
            // preconditions on our side.
            match unsafe { libloading::Library::new(path) } {
                Ok(library) => {
                    // SAFETY: `DSM_Entry` has the `DsmEntry` signature in every manager release.
                    if let Err(source) = unsafe { library.get::<DsmEntry>(ENTRY_SYMBOL) } {
                        return Err(LibraryError::MissingEntry {
                            path: path.clone(),
                            source,
                        });
                    }

                    info!(path = %path.display(), "Data source manager library loaded");
                    self.loaded = Some((path.clone(), library));

                    return Ok(());
                }
                Err(source) => {
                    debug!(path = %path.display(), error = %source, "Candidate library not loaded");
                    last_error = Some(LibraryError::Open {
                        path: path.clone(),
                        source,
                    });
                }
            }
        }

        Err(last_error.unwrap_or(LibraryError::NotFound { candidates }))
    }

    fn resolve(&self) -> Option<DsmEntry> {
        let (_, library) = self.loaded.as_ref()?;

        // SAFETY: same signature contract as in `load`; the function pointer is only used while the
        // library stays loaded, which the manager guarantees by clearing it before `unload`.
        unsafe { library.get::<DsmEntry>(ENTRY_SYMBOL) }.ok().map(|symbol| *symbol)
    }

    fn unload(&mut self) {
        if let Some((path, library)) = self.loaded.take() {
            if let Err(error) = library.close() {
                warn!(path = %path.display(), %error, "Failed to unload data source manager library");
            } else {
                debug!(path = %path.display(), "Data source manager library unloaded");
            }
        }
    }

    fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_is_the_only_candidate() {
        let library = NativeDsmLibrary::with_path("/opt/twain/libcustom.so");
        assert_eq!(
            library.candidates(true),
            vec![PathBuf::from("/opt/twain/libcustom.so")]
        );
    }

    #[test]
    fn missing_library_reports_the_path() {
        let mut library = NativeDsmLibrary::with_path("/nonexistent/ironscan/libtwaindsm.so");

        let error = library.load(false).unwrap_err();

        assert!(matches!(error, LibraryError::Open { .. }));
        assert!(error.to_string().contains("/nonexistent/ironscan/libtwaindsm.so"));
        assert!(!library.is_loaded());
        assert!(library.resolve().is_none());
    }
}
