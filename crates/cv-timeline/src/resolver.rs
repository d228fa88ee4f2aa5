//! Mapping a wall-clock [`TimeRange`] onto the archive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use cv_core::segment::elapsed_between;
use cv_core::{
    Boundary, DurationProbe, PieceExtent, ResolvedSpan, Segment, SpanPiece, TimeRange,
};

use crate::catalog::SegmentCatalog;

/// Slack allowed between one segment's end and the next one's start.
const GAP_TOLERANCE: Duration = Duration::from_secs(1);

/// Resolves time ranges into ordered `(segment, offset, duration)` pieces.
///
/// Boundaries are matched against probed durations only. A segment whose
/// duration cannot be probed (still being written, corrupt trailer) is
/// skipped for boundary matching, never guessed at.
pub struct TimeRangeResolver {
    catalog: SegmentCatalog,
    probe: Arc<dyn DurationProbe>,
}

impl TimeRangeResolver {
    pub fn new(catalog: SegmentCatalog, probe: Arc<dyn DurationProbe>) -> Self {
        Self { catalog, probe }
    }

    pub fn catalog(&self) -> &SegmentCatalog {
        &self.catalog
    }

    /// Resolve `range` against a fresh catalog snapshot.
    ///
    /// # Errors
    ///
    /// [`cv_core::Error::RangeNotFound`] naming the boundary when no probed
    /// segment covers `range.start` or `range.end`, or when the segments
    /// between them leave a hole (named after the boundary nearest to it).
    pub async fn resolve(&self, range: TimeRange) -> cv_core::Result<ResolvedSpan> {
        let segments = self.catalog.list().await?;
        let mut probed = ProbeMemo::new(self.probe.as_ref());

        let first = self
            .locate(&segments, &mut probed, range.start(), Boundary::Start)
            .await?;
        let last = self
            .locate(&segments, &mut probed, range.end(), Boundary::End)
            .await?;
        if last < first {
            return Err(cv_core::Error::range_not_found(Boundary::End, range.end()));
        }

        let pieces = if first == last {
            let segment = probed.segment(&segments[first]);
            vec![SpanPiece {
                offset: elapsed_between(segment.start, range.start()),
                duration: range.duration(),
                extent: PieceExtent::Within,
                segment,
            }]
        } else {
            let run = &segments[first..=last];
            check_contiguous(run, &probed, range)?;
            build_pieces(run, &probed, range)
        };

        tracing::debug!(
            "Resolved {range} to {} piece(s): {}",
            pieces.len(),
            pieces
                .iter()
                .map(|p| p.segment.file_name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        ResolvedSpan::new(range, pieces)
    }

    /// Index of the first segment, in ascending order, covering `at`.
    ///
    /// The start boundary uses `[start, end)`. The end boundary is exclusive
    /// in the range itself, so it matches `(start, end]`: a range ending
    /// exactly on a rotation resolves to the segment before it rather than
    /// to an empty piece of the next one.
    async fn locate(
        &self,
        segments: &[Segment],
        probed: &mut ProbeMemo<'_>,
        at: NaiveDateTime,
        boundary: Boundary,
    ) -> cv_core::Result<usize> {
        for (index, segment) in segments.iter().enumerate() {
            if segment.start > at {
                break;
            }
            let Some(duration) = probed.duration(index, segment).await else {
                continue;
            };
            let candidate = segment.clone().with_duration(duration);
            let Some(end) = candidate.end() else {
                continue;
            };
            let hit = match boundary {
                Boundary::Start => candidate.covers(at),
                Boundary::End => candidate.start < at && at <= end,
            };
            if hit {
                return Ok(index);
            }
        }

        tracing::debug!("No segment covers the {boundary} boundary {at}");
        Err(cv_core::Error::range_not_found(boundary, at))
    }
}

/// Fail when a probed segment in `run` ends noticeably before the next one
/// starts, as happens when the capture process restarts mid-range.
/// Unprobed segments cannot be checked and are assumed to run on.
fn check_contiguous(
    run: &[Segment],
    probed: &ProbeMemo<'_>,
    range: TimeRange,
) -> cv_core::Result<()> {
    for pair in run.windows(2) {
        let Some(end) = probed.segment(&pair[0]).end() else {
            continue;
        };
        let next = &pair[1];
        if elapsed_between(end, next.start) <= GAP_TOLERANCE {
            continue;
        }
        tracing::warn!(
            "Coverage gap in {range}: {} ends at {end}, {next} starts at {}",
            pair[0],
            next.start
        );
        let from_start = elapsed_between(range.start(), end);
        let to_end = elapsed_between(next.start, range.end());
        let boundary = if from_start <= to_end {
            Boundary::Start
        } else {
            Boundary::End
        };
        return Err(cv_core::Error::range_not_found(boundary, end));
    }
    Ok(())
}

/// Build the pieces of a span crossing segment boundaries.
fn build_pieces(run: &[Segment], probed: &ProbeMemo<'_>, range: TimeRange) -> Vec<SpanPiece> {
    let last_index = run.len() - 1;
    run.iter()
        .enumerate()
        .map(|(i, raw)| {
            let segment = probed.segment(raw);
            if i == 0 {
                let offset = elapsed_between(segment.start, range.start());
                SpanPiece {
                    offset,
                    duration: segment.duration.saturating_sub(offset),
                    extent: PieceExtent::ToEnd,
                    segment,
                }
            } else if i == last_index {
                SpanPiece {
                    offset: Duration::ZERO,
                    duration: elapsed_between(segment.start, range.end()),
                    extent: PieceExtent::FromStart,
                    segment,
                }
            } else {
                // Intermediate segments are taken whole by catalog order; when
                // one was never probed its nominal length runs to the next
                // segment's start.
                let duration = if segment.is_probed() {
                    segment.duration
                } else {
                    elapsed_between(segment.start, run[i + 1].start)
                };
                SpanPiece {
                    offset: Duration::ZERO,
                    duration,
                    extent: PieceExtent::Whole,
                    segment,
                }
            }
        })
        .collect()
}

/// Probe results for one resolve call, so the start and end scans do not
/// probe the same file twice.
struct ProbeMemo<'a> {
    probe: &'a dyn DurationProbe,
    durations: HashMap<usize, Option<Duration>>,
    by_path: HashMap<std::path::PathBuf, Duration>,
}

impl<'a> ProbeMemo<'a> {
    fn new(probe: &'a dyn DurationProbe) -> Self {
        Self {
            probe,
            durations: HashMap::new(),
            by_path: HashMap::new(),
        }
    }

    /// The usable duration of `segment`, or `None` when it is indeterminate.
    async fn duration(&mut self, index: usize, segment: &Segment) -> Option<Duration> {
        if let Some(known) = self.durations.get(&index) {
            return *known;
        }

        let usable = match self.probe.duration(&segment.path).await {
            Ok(d) if !d.is_zero() => Some(d),
            Ok(_) => {
                tracing::warn!("Segment {segment} has no duration yet; skipping");
                None
            }
            Err(e) => {
                tracing::warn!("Could not probe {segment}: {e}; skipping");
                None
            }
        };

        self.durations.insert(index, usable);
        if let Some(d) = usable {
            self.by_path.insert(segment.path.clone(), d);
        }
        usable
    }

    /// `segment` carrying its probed duration when one is known.
    fn segment(&self, segment: &Segment) -> Segment {
        match self.by_path.get(&segment.path) {
            Some(d) => segment.clone().with_duration(*d),
            None => segment.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{at, touch, MapProbe};
    use assert_matches::assert_matches;
    use cv_core::SegmentNaming;

    struct Fixture {
        _dir: tempfile::TempDir,
        probe: Arc<MapProbe>,
        resolver: TimeRangeResolver,
    }

    /// Archive with one file per `(start, probed seconds)`; `None` leaves
    /// the file unprobeable.
    fn archive(files: &[(NaiveDateTime, Option<u64>)]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let naming = SegmentNaming::default();
        let probe = MapProbe::new();
        for (start, secs) in files {
            let name = naming.file_name(*start);
            touch(dir.path(), &name);
            if let Some(secs) = secs {
                probe.set(&name, *secs);
            }
        }
        let catalog = SegmentCatalog::new(dir.path(), naming);
        let resolver = TimeRangeResolver::new(catalog, probe.clone());
        Fixture {
            _dir: dir,
            probe,
            resolver,
        }
    }

    /// The three-file archive with the newest still being written.
    fn rotating_archive() -> Fixture {
        archive(&[
            (at(14, 30, 0), Some(600)),
            (at(14, 40, 0), Some(600)),
            (at(14, 50, 0), None),
        ])
    }

    fn range(start: NaiveDateTime, end: NaiveDateTime) -> TimeRange {
        TimeRange::new(start, end).unwrap()
    }

    #[tokio::test]
    async fn range_inside_one_segment_is_a_single_piece() {
        let fx = rotating_archive();
        let span = fx
            .resolver
            .resolve(range(at(14, 31, 0), at(14, 39, 0)))
            .await
            .unwrap();

        assert!(span.is_single());
        let piece = &span.pieces()[0];
        assert_eq!(piece.segment.start, at(14, 30, 0));
        assert_eq!(piece.offset, Duration::from_secs(60));
        assert_eq!(piece.duration, Duration::from_secs(480));
        assert_eq!(piece.extent, PieceExtent::Within);
    }

    #[tokio::test]
    async fn range_across_a_rotation_yields_two_pieces() {
        let fx = rotating_archive();
        let span = fx
            .resolver
            .resolve(range(at(14, 35, 0), at(14, 45, 0)))
            .await
            .unwrap();

        let pieces = span.pieces();
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].segment.start, at(14, 30, 0));
        assert_eq!(pieces[0].offset, Duration::from_secs(300));
        assert_eq!(pieces[0].duration, Duration::from_secs(300));
        assert_eq!(pieces[0].extent, PieceExtent::ToEnd);
        assert_eq!(pieces[1].segment.start, at(14, 40, 0));
        assert_eq!(pieces[1].offset, Duration::ZERO);
        assert_eq!(pieces[1].duration, Duration::from_secs(300));
        assert_eq!(pieces[1].extent, PieceExtent::FromStart);
        assert_eq!(span.total_duration(), Duration::from_secs(600));
    }

    #[tokio::test]
    async fn middle_segments_are_taken_whole() {
        let fx = archive(&[
            (at(14, 0, 0), Some(600)),
            (at(14, 10, 0), Some(600)),
            (at(14, 20, 0), Some(600)),
            (at(14, 30, 0), Some(600)),
        ]);
        let span = fx
            .resolver
            .resolve(range(at(14, 5, 0), at(14, 32, 0)))
            .await
            .unwrap();

        let extents: Vec<_> = span.pieces().iter().map(|p| p.extent).collect();
        assert_eq!(
            extents,
            [
                PieceExtent::ToEnd,
                PieceExtent::Whole,
                PieceExtent::Whole,
                PieceExtent::FromStart
            ]
        );
        assert_eq!(span.pieces()[1].duration, Duration::from_secs(600));
        assert_eq!(span.total_duration(), Duration::from_secs(27 * 60));
    }

    #[tokio::test]
    async fn range_before_archive_reports_start_boundary() {
        let fx = rotating_archive();
        let err = fx
            .resolver
            .resolve(range(at(9, 0, 0), at(9, 1, 0)))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            cv_core::Error::RangeNotFound { boundary: Boundary::Start, at: t } if t == at(9, 0, 0)
        );
    }

    #[tokio::test]
    async fn range_into_unfinished_segment_reports_end_boundary() {
        let fx = rotating_archive();
        let err = fx
            .resolver
            .resolve(range(at(14, 45, 0), at(14, 55, 0)))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            cv_core::Error::RangeNotFound {
                boundary: Boundary::End,
                ..
            }
        );
    }

    #[tokio::test]
    async fn gap_in_coverage_is_not_found() {
        // The first file is short: 14:30:00..14:35:00, then nothing until 14:40.
        let fx = archive(&[(at(14, 30, 0), Some(300)), (at(14, 40, 0), Some(600))]);
        let err = fx
            .resolver
            .resolve(range(at(14, 36, 0), at(14, 41, 0)))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            cv_core::Error::RangeNotFound {
                boundary: Boundary::Start,
                ..
            }
        );
    }

    #[tokio::test]
    async fn hole_between_covered_boundaries_is_not_found() {
        // Both ends are covered, but nothing was recorded from 14:35 to 14:40.
        let fx = archive(&[(at(14, 30, 0), Some(300)), (at(14, 40, 0), Some(600))]);
        let err = fx
            .resolver
            .resolve(range(at(14, 32, 0), at(14, 45, 0)))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            cv_core::Error::RangeNotFound { boundary: Boundary::Start, at: t } if t == at(14, 35, 0)
        );

        let err = fx
            .resolver
            .resolve(range(at(14, 31, 0), at(14, 41, 0)))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            cv_core::Error::RangeNotFound { boundary: Boundary::End, .. }
        );
    }

    #[tokio::test]
    async fn one_second_rotation_slack_is_tolerated() {
        let fx = archive(&[(at(14, 30, 0), Some(599)), (at(14, 40, 0), Some(600))]);
        let span = fx
            .resolver
            .resolve(range(at(14, 35, 0), at(14, 45, 0)))
            .await
            .unwrap();
        assert_eq!(span.pieces().len(), 2);
    }

    #[tokio::test]
    async fn unprobeable_segment_is_skipped() {
        let fx = archive(&[(at(14, 30, 0), None), (at(14, 40, 0), Some(600))]);
        let err = fx
            .resolver
            .resolve(range(at(14, 31, 0), at(14, 32, 0)))
            .await
            .unwrap_err();
        assert_matches!(err, cv_core::Error::RangeNotFound { .. });

        let span = fx
            .resolver
            .resolve(range(at(14, 41, 0), at(14, 42, 0)))
            .await
            .unwrap();
        assert_eq!(span.pieces()[0].segment.start, at(14, 40, 0));
    }

    #[tokio::test]
    async fn range_ending_on_rotation_stays_in_first_segment() {
        let fx = rotating_archive();
        let span = fx
            .resolver
            .resolve(range(at(14, 35, 0), at(14, 40, 0)))
            .await
            .unwrap();
        assert!(span.is_single());
        assert_eq!(span.pieces()[0].duration, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn each_segment_is_probed_once_per_resolve() {
        let fx = rotating_archive();
        fx.resolver
            .resolve(range(at(14, 35, 0), at(14, 45, 0)))
            .await
            .unwrap();
        let calls = fx.probe.calls.lock().clone();
        let mut unique = calls.clone();
        unique.dedup();
        assert_eq!(calls, unique);
        assert_eq!(calls.len(), 2);
    }

    #[tokio::test]
    async fn empty_archive_fails_at_start() {
        let fx = archive(&[]);
        let err = fx
            .resolver
            .resolve(range(at(14, 0, 0), at(14, 1, 0)))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            cv_core::Error::RangeNotFound {
                boundary: Boundary::Start,
                ..
            }
        );
    }
}
