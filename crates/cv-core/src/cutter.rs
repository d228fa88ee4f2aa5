//! The [`MediaCutter`] collaborator: stream-copy trim and concatenation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

/// One stream-copy cut: `duration` seconds of `input` starting at `start`
/// (or through end-of-file when `duration` is `None`), written to `output`.
///
/// Cut points snap to the nearest keyframe at or before `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimRequest {
    pub input: PathBuf,
    pub start: Duration,
    pub duration: Option<Duration>,
    pub output: PathBuf,
}

impl TrimRequest {
    /// Copy the whole input.
    pub fn whole(input: &Path, output: &Path) -> Self {
        Self {
            input: input.to_path_buf(),
            start: Duration::ZERO,
            duration: None,
            output: output.to_path_buf(),
        }
    }
}

/// Trims and concatenates media without re-encoding.
///
/// Dropping an in-flight call's future must abandon the underlying work
/// (for process-backed implementations: kill the child).
#[async_trait]
pub trait MediaCutter: Send + Sync {
    /// Produce `request.output` from a window of `request.input`.
    async fn trim(&self, request: &TrimRequest) -> crate::Result<()>;

    /// Merge same-codec `fragments`, in order, into `output`.
    async fn concat(&self, fragments: &[PathBuf], output: &Path) -> crate::Result<()>;
}
