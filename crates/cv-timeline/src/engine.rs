//! The playback engine contract.
//!
//! Commands go in through [`PlaybackEngine`]; notifications come back as
//! [`EngineEvent`]s on a channel the engine was built with.

use std::fmt;
use std::path::{Path, PathBuf};

/// Something an engine can open; always a local file here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackUri {
    path: PathBuf,
}

impl PlaybackUri {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for PlaybackUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file://{}", self.path.display())
    }
}

/// Notifications produced by a playback engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Media length became known.
    LengthKnown { length_ms: u64 },
    /// Playback position moved. `position` is normalised to `[0, 1]`.
    PositionChanged { position: f64, time_ms: u64 },
    PlaybackStarted,
    EndOfStream,
    /// Decode or render fault; the loaded media is unusable.
    EngineError(String),
}

/// Commands accepted by a playback engine.
///
/// `reset` drops the loaded media and its timers; once it returns the engine
/// emits nothing more about the old media. It is invoked before every load,
/// so one engine instance lives for the whole session.
pub trait PlaybackEngine: Send {
    fn reset(&mut self);

    fn load(&mut self, uri: &PlaybackUri) -> cv_core::Result<()>;

    fn play(&mut self);

    /// Jump to a normalised position in `[0, 1]`.
    fn seek(&mut self, position: f64);

    /// Playback speed multiplier; 1.0 is normal.
    fn set_rate(&mut self, rate: f32);

    fn stop(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_displays_as_file_url() {
        let uri = PlaybackUri::from_path("/videos/CAM_USB-20251104-143000.mp4");
        assert_eq!(uri.to_string(), "file:///videos/CAM_USB-20251104-143000.mp4");
        assert_eq!(uri.path(), Path::new("/videos/CAM_USB-20251104-143000.mp4"));
    }
}
