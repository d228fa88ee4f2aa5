//! Picking the newest archive segment that is safe to play.

use std::path::Path;
use std::sync::Arc;

use cv_core::Segment;

use crate::catalog::SegmentCatalog;

/// Tells whether a segment file is still held open by its writer.
pub trait LockProbe: Send + Sync {
    /// `true` when the file looks like it is still being written. Any
    /// failure to probe counts as locked.
    fn is_locked(&self, path: &Path) -> bool;
}

/// Probes by briefly taking an exclusive lock on the file.
///
/// The handle is released before returning. On Unix this is an advisory
/// `flock`, which only detects writers that lock; the selector's
/// newest-segment exclusion covers the rest.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLockProbe;

impl LockProbe for FileLockProbe {
    fn is_locked(&self, path: &Path) -> bool {
        match try_exclusive(path) {
            Ok(()) => false,
            Err(e) => {
                tracing::trace!("Lock probe on {} failed: {e}", path.display());
                true
            }
        }
    }
}

#[cfg(unix)]
fn try_exclusive(path: &Path) -> std::io::Result<()> {
    use nix::fcntl::{Flock, FlockArg};

    let file = std::fs::File::open(path)?;
    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        // Dropping the guard unlocks and closes.
        Ok(_guard) => Ok(()),
        Err((_file, errno)) => Err(std::io::Error::from(errno)),
    }
}

#[cfg(windows)]
fn try_exclusive(path: &Path) -> std::io::Result<()> {
    use std::os::windows::fs::OpenOptionsExt;

    std::fs::OpenOptions::new()
        .read(true)
        .share_mode(0)
        .open(path)
        .map(drop)
}

#[cfg(not(any(unix, windows)))]
fn try_exclusive(path: &Path) -> std::io::Result<()> {
    std::fs::File::open(path).map(drop)
}

/// Chooses the live tail: the newest sealed segment.
///
/// The newest file is always excluded because the capture process is still
/// writing it. Of the rest, newest first, the first one that is not locked
/// wins. When every candidate is locked the second-newest is returned
/// anyway, unless fallback is disabled.
pub struct LiveTailSelector {
    catalog: SegmentCatalog,
    locks: Arc<dyn LockProbe>,
    fallback_to_locked: bool,
}

impl LiveTailSelector {
    pub fn new(catalog: SegmentCatalog, locks: Arc<dyn LockProbe>) -> Self {
        Self {
            catalog,
            locks,
            fallback_to_locked: true,
        }
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback_to_locked: bool) -> Self {
        self.fallback_to_locked = fallback_to_locked;
        self
    }

    pub fn catalog(&self) -> &SegmentCatalog {
        &self.catalog
    }

    /// Select the segment to follow.
    ///
    /// # Errors
    ///
    /// [`cv_core::Error::NoLiveCandidate`] when the archive holds fewer than
    /// two segments, or when all candidates are locked and fallback is off.
    pub async fn select(&self) -> cv_core::Result<Segment> {
        let segments = self.catalog.list().await?;
        let Some((newest, rest)) = segments.split_last() else {
            return Err(cv_core::Error::NoLiveCandidate("archive is empty".into()));
        };
        let Some(second_newest) = rest.last() else {
            return Err(cv_core::Error::NoLiveCandidate(format!(
                "only {newest} exists and it is still being written"
            )));
        };
        tracing::trace!("Excluding newest segment {newest}");

        // Lock probing opens files; keep it off the async workers.
        let locks = Arc::clone(&self.locks);
        let candidates: Vec<Segment> = rest.iter().rev().cloned().collect();
        let unlocked = tokio::task::spawn_blocking(move || {
            candidates.into_iter().find(|candidate| {
                let locked = locks.is_locked(&candidate.path);
                if locked {
                    tracing::debug!("{candidate} is locked; trying an older segment");
                }
                !locked
            })
        })
        .await
        .map_err(|e| cv_core::Error::Internal(format!("lock probe task failed: {e}")))?;

        if let Some(candidate) = unlocked {
            tracing::debug!("Live tail is {candidate}");
            return Ok(candidate);
        }

        if self.fallback_to_locked {
            tracing::warn!("Every candidate is locked; falling back to {second_newest}");
            return Ok(second_newest.clone());
        }
        Err(cv_core::Error::NoLiveCandidate(format!(
            "all {} candidate(s) are locked",
            rest.len()
        )))
    }
}
