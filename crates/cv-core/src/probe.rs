//! The [`DurationProbe`] collaborator: reads a segment's actual duration
//! from its container.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

/// Reads the playable duration of a media file.
///
/// Implementations must be safe to share across threads (`Send + Sync`).
/// A file whose container index is absent (still being written) may yield
/// either an error or `Duration::ZERO`; callers treat both as
/// "indeterminate, not yet usable".
#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// Human-readable name identifying this probe implementation.
    fn name(&self) -> &'static str;

    /// Probe the duration of the file at `path`.
    async fn duration(&self, path: &Path) -> crate::Result<Duration>;
}
