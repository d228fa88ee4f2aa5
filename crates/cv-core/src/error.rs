//! Unified error type for camvault.
//!
//! All crates funnel their failures into [`Error`]. Each variant carries
//! enough context (failing path, pipeline stage, boundary) for the caller
//! to log and retry; nothing here is fatal to the host process.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Which end of a requested time range failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    Start,
    End,
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::End => write!(f, "end"),
        }
    }
}

/// Unified error type covering all failure modes in camvault.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "segment", "tool").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg, ffprobe) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Media probing failed.
    #[error("Probe error: {0}")]
    Probe(String),

    /// No archive segment covers one boundary of a requested range.
    #[error("No segment covers the {boundary} of the range ({at})")]
    RangeNotFound {
        /// The boundary that could not be matched.
        boundary: Boundary,
        /// The instant that was looked up.
        at: NaiveDateTime,
    },

    /// A trim or concat step of clip assembly failed.
    #[error("Assembly failed at {stage} ({}): {message}", path.display())]
    Assembly {
        /// The pipeline stage that failed (e.g. "trim 2/3", "concat").
        stage: String,
        /// The file the stage was working on.
        path: PathBuf,
        /// Human-readable error description.
        message: String,
    },

    /// No segment is currently safe to follow as the live tail.
    #[error("No live segment available: {0}")]
    NoLiveCandidate(String),

    /// The playback engine reported a decode/render fault.
    #[error("Playback engine error: {0}")]
    Engine(String),

    /// The operation was superseded or cancelled before completion.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a control loop can keep running after seeing this error.
    ///
    /// Everything except internal invariant violations is recoverable.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Internal(_))
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::RangeNotFound`].
    pub fn range_not_found(boundary: Boundary, at: NaiveDateTime) -> Self {
        Error::RangeNotFound { boundary, at }
    }

    /// Convenience constructor for [`Error::Assembly`].
    pub fn assembly(stage: impl Into<String>, path: &Path, message: impl fmt::Display) -> Self {
        Error::Assembly {
            stage: stage.into(),
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
