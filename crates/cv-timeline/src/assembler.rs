//! Turning a [`ResolvedSpan`] into one playable clip file.
//!
//! A single-piece span is trimmed straight into the output directory. A
//! multi-piece span is trimmed fragment by fragment into a fresh
//! [`ScratchArea`] and then concatenated. Everything is stream copy; cut
//! points snap to keyframes.
//!
//! The scratch area and any partially written output are removed on every
//! exit path: success, a failed step, or cancellation (which drops the
//! in-flight future and with it the running ffmpeg process).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cv_av::ScratchArea;
use cv_core::{Clip, ClipId, MediaCutter, PieceExtent, ResolvedSpan, SpanPiece, TrimRequest};
use tokio_util::sync::CancellationToken;

/// Builds clips through a [`MediaCutter`].
pub struct ClipAssembler {
    cutter: Arc<dyn MediaCutter>,
    output_dir: PathBuf,
    scratch_root: PathBuf,
    extension: String,
}

impl ClipAssembler {
    pub fn new(
        cutter: Arc<dyn MediaCutter>,
        output_dir: impl Into<PathBuf>,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cutter,
            output_dir: output_dir.into(),
            scratch_root: scratch_root.into(),
            extension: "mp4".into(),
        }
    }

    /// Container extension for fragments and the final clip.
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Assemble `span` into a new clip owned by the caller.
    ///
    /// # Errors
    ///
    /// [`cv_core::Error::Assembly`] naming the failed stage and file, or
    /// [`cv_core::Error::Cancelled`] if `cancel` fires first.
    pub async fn assemble(
        &self,
        span: &ResolvedSpan,
        cancel: &CancellationToken,
    ) -> cv_core::Result<Clip> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Assembly of {} cancelled", span.range());
                Err(cv_core::Error::Cancelled(format!("assembly of {}", span.range())))
            }
            result = self.build(span) => result,
        }
    }

    async fn build(&self, span: &ResolvedSpan) -> cv_core::Result<Clip> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| cv_core::Error::assembly("prepare", &self.output_dir, e))?;

        let id = ClipId::new();
        let pieces = span.pieces();
        tracing::info!(
            clip_id = %id,
            "Assembling {} from {} segment(s)",
            span.range(),
            pieces.len()
        );

        let path = if let [piece] = pieces {
            self.build_single(id, piece).await?
        } else {
            self.build_merged(id, pieces).await?
        };

        tracing::info!(clip_id = %id, "Clip ready at {}", path.display());
        Ok(Clip {
            id,
            path,
            range: span.range(),
            duration: span.total_duration(),
            segment_count: pieces.len(),
        })
    }

    async fn build_single(&self, id: ClipId, piece: &SpanPiece) -> cv_core::Result<PathBuf> {
        let output = self
            .output_dir
            .join(format!("playback_{id}.{}", self.extension));
        let partial = PartialOutput::new(&output);

        self.cutter
            .trim(&trim_request(piece, &output))
            .await
            .map_err(|e| cv_core::Error::assembly("trim", &piece.segment.path, e))?;

        Ok(partial.keep())
    }

    async fn build_merged(&self, id: ClipId, pieces: &[SpanPiece]) -> cv_core::Result<PathBuf> {
        let scratch = ScratchArea::new(&self.scratch_root)
            .map_err(|e| cv_core::Error::assembly("scratch", &self.scratch_root, e))?;

        let total = pieces.len();
        let mut fragments = Vec::with_capacity(total);
        for (i, piece) in pieces.iter().enumerate() {
            let fragment = scratch.fragment(i, &self.extension);
            tracing::debug!(
                "Trimming {} ({:?}) into {}",
                piece.segment,
                piece.extent,
                fragment.display()
            );
            self.cutter
                .trim(&trim_request(piece, &fragment))
                .await
                .map_err(|e| {
                    cv_core::Error::assembly(format!("trim {}/{total}", i + 1), &piece.segment.path, e)
                })?;
            fragments.push(fragment);
        }

        let output = self
            .output_dir
            .join(format!("playback_merged_{id}.{}", self.extension));
        let partial = PartialOutput::new(&output);
        self.cutter
            .concat(&fragments, &output)
            .await
            .map_err(|e| cv_core::Error::assembly("concat", &output, e))?;
        let output = partial.keep();

        if let Err(e) = scratch.close() {
            tracing::warn!("Scratch cleanup failed: {e}");
        }
        Ok(output)
    }
}

/// The cut for one piece of a span.
fn trim_request(piece: &SpanPiece, output: &Path) -> TrimRequest {
    let input = piece.segment.path.as_path();
    match piece.extent {
        PieceExtent::Whole => TrimRequest::whole(input, output),
        PieceExtent::ToEnd => TrimRequest {
            input: input.to_path_buf(),
            start: piece.offset,
            duration: None,
            output: output.to_path_buf(),
        },
        PieceExtent::FromStart => TrimRequest {
            input: input.to_path_buf(),
            start: Duration::ZERO,
            duration: Some(piece.duration),
            output: output.to_path_buf(),
        },
        PieceExtent::Within => TrimRequest {
            input: input.to_path_buf(),
            start: piece.offset,
            duration: Some(piece.duration),
            output: output.to_path_buf(),
        },
    }
}

/// Removes a final output file on drop unless [`PartialOutput::keep`] was
/// called.
struct PartialOutput {
    path: Option<PathBuf>,
}

impl PartialOutput {
    fn new(path: &Path) -> Self {
        Self {
            path: Some(path.to_path_buf()),
        }
    }

    fn keep(mut self) -> PathBuf {
        self.path.take().unwrap_or_default()
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!("Removed partial output {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Could not remove partial output {}: {e}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{at, ScriptedCutter};
    use assert_matches::assert_matches;
    use cv_core::{Segment, TimeRange};

    fn segment(dir: &Path, h: u32, m: u32) -> Segment {
        let start = at(h, m, 0);
        let path = dir.join(cv_core::SegmentNaming::default().file_name(start));
        std::fs::write(&path, b"segment").unwrap();
        Segment::new(path, start).with_duration(Duration::from_secs(600))
    }

    fn piece(segment: Segment, offset: u64, duration: u64, extent: PieceExtent) -> SpanPiece {
        SpanPiece {
            segment,
            offset: Duration::from_secs(offset),
            duration: Duration::from_secs(duration),
            extent,
        }
    }

    fn three_piece_span(dir: &Path) -> ResolvedSpan {
        let range = TimeRange::new(at(14, 5, 0), at(14, 25, 0)).unwrap();
        ResolvedSpan::new(
            range,
            vec![
                piece(segment(dir, 14, 0), 300, 300, PieceExtent::ToEnd),
                piece(segment(dir, 14, 10), 0, 600, PieceExtent::Whole),
                piece(segment(dir, 14, 20), 0, 300, PieceExtent::FromStart),
            ],
        )
        .unwrap()
    }

    struct Dirs {
        archive: tempfile::TempDir,
        out: tempfile::TempDir,
        scratch: tempfile::TempDir,
    }

    fn dirs() -> Dirs {
        Dirs {
            archive: tempfile::tempdir().unwrap(),
            out: tempfile::tempdir().unwrap(),
            scratch: tempfile::tempdir().unwrap(),
        }
    }

    fn assembler(cutter: Arc<ScriptedCutter>, dirs: &Dirs) -> ClipAssembler {
        ClipAssembler::new(cutter, dirs.out.path(), dirs.scratch.path())
    }

    fn is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn single_piece_is_one_trim() {
        let dirs = dirs();
        let cutter = Arc::new(ScriptedCutter::default());
        let range = TimeRange::new(at(14, 31, 0), at(14, 39, 0)).unwrap();
        let span = ResolvedSpan::new(
            range,
            vec![piece(segment(dirs.archive.path(), 14, 30), 60, 480, PieceExtent::Within)],
        )
        .unwrap();

        let clip = assembler(cutter.clone(), &dirs)
            .assemble(&span, &CancellationToken::new())
            .await
            .unwrap();

        let trims = cutter.trims.lock().clone();
        assert_eq!(trims.len(), 1);
        assert_eq!(trims[0].start, Duration::from_secs(60));
        assert_eq!(trims[0].duration, Some(Duration::from_secs(480)));
        assert_eq!(trims[0].output, clip.path);
        assert!(cutter.concats.lock().is_empty());

        assert!(clip.path.exists());
        assert!(clip.path.starts_with(dirs.out.path()));
        let name = clip.path.file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(name, format!("playback_{}.mp4", clip.id));
        assert_eq!(clip.duration, Duration::from_secs(480));
        assert_eq!(clip.segment_count, 1);
        assert!(is_empty(dirs.scratch.path()));
    }

    #[tokio::test]
    async fn multi_piece_trims_each_then_concats() {
        let dirs = dirs();
        let cutter = Arc::new(ScriptedCutter::default());
        let span = three_piece_span(dirs.archive.path());

        let clip = assembler(cutter.clone(), &dirs)
            .assemble(&span, &CancellationToken::new())
            .await
            .unwrap();

        let trims = cutter.trims.lock().clone();
        assert_eq!(trims.len(), 3);
        assert_eq!(trims[0].start, Duration::from_secs(300));
        assert_eq!(trims[0].duration, None);
        assert_eq!(trims[1].start, Duration::ZERO);
        assert_eq!(trims[1].duration, None);
        assert_eq!(trims[2].start, Duration::ZERO);
        assert_eq!(trims[2].duration, Some(Duration::from_secs(300)));
        let names: Vec<_> = trims
            .iter()
            .map(|t| t.output.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["0.mp4", "1.mp4", "2.mp4"]);

        let concats = cutter.concats.lock().clone();
        assert_eq!(concats.len(), 1);
        let outputs: Vec<_> = trims.iter().map(|t| t.output.clone()).collect();
        assert_eq!(concats[0].0, outputs);
        assert_eq!(concats[0].1, clip.path);

        let name = clip.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("playback_merged_"), "{name}");
        assert_eq!(clip.duration, Duration::from_secs(1200));
        assert_eq!(clip.segment_count, 3);
        assert!(clip.path.exists());
        assert!(is_empty(dirs.scratch.path()), "scratch area left behind");
    }

    #[tokio::test]
    async fn failed_middle_trim_aborts_and_cleans_scratch() {
        let dirs = dirs();
        let cutter = Arc::new(ScriptedCutter {
            fail_trim_at: Some(1),
            ..ScriptedCutter::default()
        });
        let span = three_piece_span(dirs.archive.path());

        let err = assembler(cutter.clone(), &dirs)
            .assemble(&span, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_matches!(
            &err,
            cv_core::Error::Assembly { stage, path, .. }
                if stage == "trim 2/3" && path == &span.pieces()[1].segment.path
        );
        assert_eq!(cutter.trims.lock().len(), 2);
        assert!(cutter.concats.lock().is_empty());
        assert!(is_empty(dirs.scratch.path()), "scratch area left behind");
        assert!(is_empty(dirs.out.path()));
    }

    #[tokio::test]
    async fn failed_concat_leaves_nothing_behind() {
        let dirs = dirs();
        let cutter = Arc::new(ScriptedCutter {
            fail_concat: true,
            ..ScriptedCutter::default()
        });
        let span = three_piece_span(dirs.archive.path());

        let err = assembler(cutter, &dirs)
            .assemble(&span, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, cv_core::Error::Assembly { stage, .. } if stage == "concat");
        assert!(is_empty(dirs.scratch.path()));
        assert!(is_empty(dirs.out.path()));
    }

    #[tokio::test]
    async fn failed_single_trim_removes_partial_output() {
        let dirs = dirs();
        let cutter = Arc::new(ScriptedCutter {
            fail_trim_at: Some(0),
            ..ScriptedCutter::default()
        });
        let range = TimeRange::new(at(14, 31, 0), at(14, 32, 0)).unwrap();
        let span = ResolvedSpan::new(
            range,
            vec![piece(segment(dirs.archive.path(), 14, 30), 60, 60, PieceExtent::Within)],
        )
        .unwrap();

        let err = assembler(cutter, &dirs)
            .assemble(&span, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, cv_core::Error::Assembly { stage, .. } if stage == "trim");
        assert!(is_empty(dirs.out.path()));
    }

    #[tokio::test]
    async fn cancellation_abandons_work_and_cleans_up() {
        let dirs = dirs();
        let cutter = Arc::new(ScriptedCutter {
            hang: true,
            ..ScriptedCutter::default()
        });
        let span = three_piece_span(dirs.archive.path());
        let cancel = CancellationToken::new();

        let assembler = assembler(cutter.clone(), &dirs);
        let canceller = cancel.clone();
        let watched = cutter.clone();
        let (result, ()) = tokio::join!(assembler.assemble(&span, &cancel), async move {
            while watched.trims.lock().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            canceller.cancel();
        });

        assert_matches!(result, Err(cv_core::Error::Cancelled(_)));
        assert_eq!(cutter.trims.lock().len(), 1);
        assert!(is_empty(dirs.scratch.path()), "scratch area left behind");
    }

    #[tokio::test]
    async fn each_assembly_gets_its_own_scratch_area() {
        let dirs = dirs();
        let cutter = Arc::new(ScriptedCutter::default());
        let span = three_piece_span(dirs.archive.path());
        let assembler = assembler(cutter.clone(), &dirs);

        let a = assembler.assemble(&span, &CancellationToken::new()).await.unwrap();
        let b = assembler.assemble(&span, &CancellationToken::new()).await.unwrap();
        assert_ne!(a.path, b.path);

        let trims = cutter.trims.lock().clone();
        assert_ne!(trims[0].output.parent(), trims[3].output.parent());
    }
}
