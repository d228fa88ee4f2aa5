//! The segment catalog: a fresh, ordered snapshot of the archive directory.

use std::path::{Path, PathBuf};

use cv_core::{Segment, SegmentNaming};

/// Enumerates the flat archive directory written by the capture process.
///
/// Every call to [`SegmentCatalog::list`] re-reads the directory; the
/// archive changes underneath us and a cached listing is never trusted.
#[derive(Debug, Clone)]
pub struct SegmentCatalog {
    dir: PathBuf,
    naming: SegmentNaming,
}

impl SegmentCatalog {
    pub fn new(dir: impl Into<PathBuf>, naming: SegmentNaming) -> Self {
        Self {
            dir: dir.into(),
            naming,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn naming(&self) -> &SegmentNaming {
        &self.naming
    }

    /// List all segments, oldest first (newest last).
    ///
    /// Files whose names do not parse are skipped. Ordering is by file name,
    /// which the naming scheme guarantees is start-time order. Durations are
    /// left unprobed. A missing archive directory yields an empty catalog.
    pub async fn list(&self) -> cv_core::Result<Vec<Segment>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Archive directory {} does not exist", self.dir.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut named: Vec<(String, Segment)> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if !file_type.is_file() {
                continue;
            }

            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };

            match self.naming.parse(name) {
                Some(start) => named.push((name.to_string(), Segment::new(entry.path(), start))),
                None => tracing::trace!("Skipping non-segment file {name}"),
            }
        }

        named.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(named.into_iter().map(|(_, segment)| segment).collect())
    }
}
