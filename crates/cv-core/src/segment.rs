//! Archive domain types: segments, time ranges, resolved spans, and clips.
//!
//! A [`Segment`] is one rotated file written by the capture process. Its
//! start time comes from the file name (see [`SegmentNaming`]); its duration
//! is probed from the file contents and is `Duration::ZERO` until probed or
//! when the file cannot be probed.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::ClipId;

/// Format of the 14-digit timestamp embedded in segment file names.
const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Serde helpers to (de)serialize `Duration` as fractional seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Add a std `Duration` to a wall-clock instant, saturating on overflow.
pub fn add_duration(at: NaiveDateTime, d: Duration) -> NaiveDateTime {
    TimeDelta::from_std(d)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(NaiveDateTime::MAX)
}

/// Elapsed time from `earlier` to `later`, or `Duration::ZERO` when
/// `later` is not after `earlier`.
pub fn elapsed_between(earlier: NaiveDateTime, later: NaiveDateTime) -> Duration {
    (later - earlier).to_std().unwrap_or(Duration::ZERO)
}

// ---------------------------------------------------------------------------
// SegmentNaming
// ---------------------------------------------------------------------------

/// The fixed `{prefix}-{yyyyMMdd}-{HHmmss}.{extension}` naming scheme.
///
/// Matching is case-sensitive. Because the timestamp is zero-padded and
/// most-significant first, lexical order of names equals start-time order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentNaming {
    pub prefix: String,
    pub extension: String,
}

impl Default for SegmentNaming {
    fn default() -> Self {
        Self {
            prefix: "CAM_USB".into(),
            extension: "mp4".into(),
        }
    }
}

impl SegmentNaming {
    pub fn new(prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            extension: extension.into(),
        }
    }

    /// Parse a bare file name into the segment's start time.
    ///
    /// Returns `None` for anything that does not match the scheme exactly.
    pub fn parse(&self, file_name: &str) -> Option<NaiveDateTime> {
        let stem = file_name
            .strip_suffix(self.extension.as_str())?
            .strip_suffix('.')?;
        let stamp = stem.strip_prefix(self.prefix.as_str())?.strip_prefix('-')?;

        let mut parts = stamp.split('-');
        let date = parts.next()?;
        let time = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        if date.len() != 8 || time.len() != 6 {
            return None;
        }
        if !date.bytes().chain(time.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }

        NaiveDateTime::parse_from_str(&format!("{date}{time}"), STAMP_FORMAT).ok()
    }

    /// Render the file name the capture process uses for `start`.
    pub fn file_name(&self, start: NaiveDateTime) -> String {
        format!(
            "{}-{}.{}",
            self.prefix,
            start.format("%Y%m%d-%H%M%S"),
            self.extension
        )
    }
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// One archive file.
///
/// Equality is by path: the path is the segment's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub path: PathBuf,
    pub start: NaiveDateTime,
    /// Probed duration; `Duration::ZERO` means unprobed or indeterminate.
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Segment {}

impl Segment {
    pub fn new(path: PathBuf, start: NaiveDateTime) -> Self {
        Self {
            path,
            start,
            duration: Duration::ZERO,
        }
    }

    /// Return a copy carrying the given probed duration.
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Whether a usable (non-zero) duration is known.
    pub fn is_probed(&self) -> bool {
        !self.duration.is_zero()
    }

    /// `start + duration`, or `None` while the duration is indeterminate.
    pub fn end(&self) -> Option<NaiveDateTime> {
        self.is_probed()
            .then(|| add_duration(self.start, self.duration))
    }

    /// Whether `t` falls in `[start, end)`.
    pub fn covers(&self, t: NaiveDateTime) -> bool {
        self.end().is_some_and(|end| self.start <= t && t < end)
    }

    /// The bare file name, for logging.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_name())
    }
}

// ---------------------------------------------------------------------------
// TimeRange
// ---------------------------------------------------------------------------

/// A half-open wall-clock range `[start, end)` with `end > start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TimeRangeFields")]
pub struct TimeRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

/// Unchecked wire form of [`TimeRange`].
#[derive(Deserialize)]
struct TimeRangeFields {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl TryFrom<TimeRangeFields> for TimeRange {
    type Error = Error;

    fn try_from(fields: TimeRangeFields) -> Result<Self> {
        Self::new(fields.start, fields.end)
    }
}

impl TimeRange {
    /// Build a range, rejecting `end <= start`.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if end <= start {
            return Err(Error::Validation(format!(
                "time range end ({end}) must be after start ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn duration(&self) -> Duration {
        elapsed_between(self.start, self.end)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// ---------------------------------------------------------------------------
// ResolvedSpan
// ---------------------------------------------------------------------------

/// How much of its segment a [`SpanPiece`] takes, which decides the cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PieceExtent {
    /// The whole range lies inside this one segment.
    Within,
    /// From `offset` to the end of the file (first of several pieces).
    ToEnd,
    /// From the start of the file for `duration` (last of several pieces).
    FromStart,
    /// The entire file (intermediate pieces).
    Whole,
}

/// One `(segment, offset, duration)` triple of a [`ResolvedSpan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanPiece {
    pub segment: Segment,
    #[serde(with = "duration_secs")]
    pub offset: Duration,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub extent: PieceExtent,
}

/// An ordered, non-empty sequence of pieces covering a [`TimeRange`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ResolvedSpanFields")]
pub struct ResolvedSpan {
    range: TimeRange,
    pieces: Vec<SpanPiece>,
}

#[derive(Deserialize)]
struct ResolvedSpanFields {
    range: TimeRange,
    pieces: Vec<SpanPiece>,
}

impl TryFrom<ResolvedSpanFields> for ResolvedSpan {
    type Error = Error;

    fn try_from(fields: ResolvedSpanFields) -> Result<Self> {
        Self::new(fields.range, fields.pieces)
    }
}

impl ResolvedSpan {
    /// Build a span; an empty piece list is rejected.
    pub fn new(range: TimeRange, pieces: Vec<SpanPiece>) -> Result<Self> {
        if pieces.is_empty() {
            return Err(Error::Internal(format!("empty span for {range}")));
        }
        Ok(Self { range, pieces })
    }

    pub fn range(&self) -> TimeRange {
        self.range
    }

    pub fn pieces(&self) -> &[SpanPiece] {
        &self.pieces
    }

    pub fn is_single(&self) -> bool {
        self.pieces.len() == 1
    }

    /// Sum of the intra-segment durations.
    pub fn total_duration(&self) -> Duration {
        self.pieces.iter().map(|p| p.duration).sum()
    }
}

// ---------------------------------------------------------------------------
// Clip
// ---------------------------------------------------------------------------

/// A fully assembled, independently playable clip file.
///
/// The clip is owned by whoever received it; call [`Clip::discard`] once it
/// is no longer needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: ClipId,
    pub path: PathBuf,
    pub range: TimeRange,
    /// Expected duration (sum of the span's piece durations).
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    /// Number of source segments the clip was cut from.
    pub segment_count: usize,
}

impl Clip {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the clip file. A file that is already gone is not an error.
    pub async fn discard(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::debug!("Discarded clip {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
