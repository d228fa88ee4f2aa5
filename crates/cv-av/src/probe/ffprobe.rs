//! FFprobe-based [`cv_core::DurationProbe`] implementation.
//!
//! Shells out to `ffprobe -v quiet -print_format json -show_format` and
//! reads `format.duration`. A segment that is still being written usually
//! has no container index yet; ffprobe then either fails or reports no
//! duration, both of which surface as "indeterminate".

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Default per-probe timeout; probing reads only the container header.
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// A duration probe backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeDurationProbe {
    /// Path to the ffprobe binary.
    ffprobe_path: PathBuf,
    timeout: Duration,
}

impl FfprobeDurationProbe {
    /// Create a new probe using the given ffprobe path.
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self {
            ffprobe_path,
            timeout: PROBE_TIMEOUT,
        }
    }

    /// Create a probe from the registry's ffprobe entry.
    pub fn from_registry(tools: &ToolRegistry) -> cv_core::Result<Self> {
        let ffprobe = tools.require("ffprobe")?;
        Ok(Self {
            ffprobe_path: ffprobe.path.clone(),
            timeout: ffprobe.timeout.min(PROBE_TIMEOUT),
        })
    }
}

#[async_trait]
impl cv_core::DurationProbe for FfprobeDurationProbe {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    async fn duration(&self, path: &Path) -> cv_core::Result<Duration> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.timeout(self.timeout);
        cmd.args(["-v", "quiet", "-print_format", "json", "-show_format"]);
        cmd.path_arg(path);

        let output = cmd.execute().await?;
        let duration = parse_duration(&output.stdout)?;
        if duration.is_zero() {
            tracing::debug!("ffprobe reported no duration for {}", path.display());
        }
        Ok(duration)
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Extract `format.duration` from ffprobe JSON; absent or non-positive
/// durations map to `Duration::ZERO`.
fn parse_duration(json: &str) -> cv_core::Result<Duration> {
    let ff: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| cv_core::Error::Probe(format!("ffprobe JSON parse error: {e}")))?;

    Ok(ff
        .format
        .and_then(|f| f.duration)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(Duration::ZERO))
}
