//! Application configuration types.
//!
//! The top-level [`Config`] struct carries all sub-configs for the archive,
//! external tools, clip output, live following, and seek handling. Every
//! section defaults sensibly so a completely empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::segment::SegmentNaming;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub archive: ArchiveConfig,
    pub tools: ToolsConfig,
    pub clips: ClipConfig,
    pub live: LiveConfig,
    pub seek: SeekConfig,
}

impl Config {
    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.archive.dir.is_dir() {
            warnings.push(format!(
                "archive.dir {} does not exist or is not a directory",
                self.archive.dir.display()
            ));
        }
        if self.archive.prefix.is_empty() {
            warnings.push("archive.prefix is empty".into());
        }
        if self.archive.extension.is_empty() {
            warnings.push("archive.extension is empty".into());
        }
        if self.live.poll_interval_ms == 0 {
            warnings.push("live.poll_interval_ms is 0; polling will spin".into());
        }
        if self.live.fast_forward_rate <= 1.0 {
            warnings.push(format!(
                "live.fast_forward_rate {} does not speed playback up",
                self.live.fast_forward_rate
            ));
        }
        if self.live.rewind_tick_ms == 0 {
            warnings.push("live.rewind_tick_ms is 0".into());
        }
        if !(self.seek.tolerance > 0.0 && self.seek.tolerance < 1.0) {
            warnings.push(format!(
                "seek.tolerance {} is outside (0, 1)",
                self.seek.tolerance
            ));
        }
        if self.tools.timeout_secs == 0 {
            warnings.push("tools.timeout_secs is 0; every tool call will time out".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Where the capture process writes segments and how it names them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub dir: PathBuf,
    pub prefix: String,
    pub extension: String,
    /// Nominal rotation interval of the capture process (informational;
    /// resolution always uses probed durations).
    pub rotation_secs: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        let naming = SegmentNaming::default();
        Self {
            dir: PathBuf::from("./videostore"),
            prefix: naming.prefix,
            extension: naming.extension,
            rotation_secs: 600,
        }
    }
}

impl ArchiveConfig {
    pub fn naming(&self) -> SegmentNaming {
        SegmentNaming::new(self.prefix.clone(), self.extension.clone())
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            timeout_secs: 300,
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Where assembled clips and per-assembly scratch areas are created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipConfig {
    /// Defaults to the system temp directory.
    pub output_dir: Option<PathBuf>,
    /// Defaults to the system temp directory.
    pub scratch_dir: Option<PathBuf>,
}

impl ClipConfig {
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Live-tail following and transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub poll_interval_ms: u64,
    /// Seek this far before the end of a freshly loaded live segment;
    /// 0 plays it from the start.
    pub near_live_lookback_secs: u64,
    /// Offer the second-newest segment when every candidate is locked.
    pub fallback_to_locked: bool,
    pub fast_forward_rate: f32,
    pub rewind_tick_ms: u64,
    pub rewind_step_ms: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
            near_live_lookback_secs: 30,
            fallback_to_locked: true,
            fast_forward_rate: 3.0,
            rewind_tick_ms: 250,
            rewind_step_ms: 1000,
        }
    }
}

impl LiveConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn near_live_lookback(&self) -> Option<Duration> {
        (self.near_live_lookback_secs > 0)
            .then(|| Duration::from_secs(self.near_live_lookback_secs))
    }

    pub fn rewind_tick(&self) -> Duration {
        Duration::from_millis(self.rewind_tick_ms)
    }

    pub fn rewind_step(&self) -> Duration {
        Duration::from_millis(self.rewind_step_ms)
    }
}

/// Seek debounce and position-report throttling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeekConfig {
    /// Normalised distance at which a reported position confirms a seek.
    pub tolerance: f64,
    pub timeout_ms: u64,
    pub progress_interval_ms: u64,
}

impl Default for SeekConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.02,
            timeout_ms: 500,
            progress_interval_ms: 100,
        }
    }
}

impl SeekConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_default() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.live.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.seek.tolerance, 0.02);
        assert_eq!(config.archive.naming(), SegmentNaming::default());
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"live": {"poll_interval_ms": 250}}"#).unwrap();
        assert_eq!(config.live.poll_interval_ms, 250);
        assert_eq!(config.live.rewind_tick_ms, 250);
        assert!(config.live.fallback_to_locked);
    }

    #[test]
    fn zero_lookback_disables_near_live_seek() {
        let live = LiveConfig {
            near_live_lookback_secs: 0,
            ..LiveConfig::default()
        };
        assert_eq!(live.near_live_lookback(), None);
        assert_eq!(
            LiveConfig::default().near_live_lookback(),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn validate_flags_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.archive.dir = dir.path().to_path_buf();
        assert!(config.validate().is_empty(), "{:?}", config.validate());

        config.live.poll_interval_ms = 0;
        config.seek.tolerance = 1.5;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2, "{warnings:?}");
        assert!(warnings.iter().any(|w| w.contains("poll_interval_ms")));
        assert!(warnings.iter().any(|w| w.contains("tolerance")));
    }

    #[test]
    fn validate_flags_missing_archive_dir() {
        let mut config = Config::default();
        config.archive.dir = PathBuf::from("/definitely/not/here/camvault");
        assert!(config.validate().iter().any(|w| w.contains("archive.dir")));
    }
}
