//! Scratch work areas for multi-step media operations.
//!
//! A [`ScratchArea`] is a uniquely named temporary directory owned by a
//! single operation. It is removed when dropped, so every exit path
//! (success, error, cancellation, panic unwind) cleans it up, and fragments
//! from one assembly can never leak into another.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Name prefix for scratch directories.
const SCRATCH_PREFIX: &str = "camvault-assemble-";

/// Exclusively owned temporary directory for intermediate fragments.
///
/// # Example
///
/// ```no_run
/// use cv_av::ScratchArea;
///
/// let scratch = ScratchArea::new(&std::env::temp_dir()).unwrap();
/// let first = scratch.fragment(0, "mp4");
/// // ... write fragments, merge them ...
/// scratch.close().unwrap();
/// ```
#[derive(Debug)]
pub struct ScratchArea {
    temp_dir: TempDir,
}

impl ScratchArea {
    /// Create a fresh, uniquely named directory under `root`.
    pub fn new(root: &Path) -> cv_core::Result<Self> {
        std::fs::create_dir_all(root).map_err(|e| {
            cv_core::Error::tool(
                "scratch",
                format!("failed to create scratch root {}: {e}", root.display()),
            )
        })?;
        let temp_dir = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(root)
            .map_err(|e| cv_core::Error::tool("scratch", format!("failed to create temp dir: {e}")))?;

        tracing::debug!("Created scratch area {}", temp_dir.path().display());
        Ok(Self { temp_dir })
    }

    /// Path to the scratch directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Path of the numbered fragment `index` (`0.mp4`, `1.mp4`, ...).
    pub fn fragment(&self, index: usize, extension: &str) -> PathBuf {
        self.temp_dir.path().join(format!("{index}.{extension}"))
    }

    /// Remove the directory now, reporting failures instead of ignoring
    /// them as `Drop` does.
    pub fn close(self) -> cv_core::Result<()> {
        let path = self.temp_dir.path().to_path_buf();
        self.temp_dir.close().map_err(|e| {
            cv_core::Error::tool(
                "scratch",
                format!("failed to remove {}: {e}", path.display()),
            )
        })
    }
}
