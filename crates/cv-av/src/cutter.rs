//! [`cv_core::MediaCutter`] backed by the ffmpeg CLI.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cv_core::TrimRequest;

use crate::actions;
use crate::tools::ToolRegistry;

/// Trims and concatenates with `ffmpeg -c copy`.
#[derive(Debug, Clone)]
pub struct FfmpegCutter {
    tools: ToolRegistry,
}

impl FfmpegCutter {
    /// Build a cutter; fails early when ffmpeg was not discovered.
    pub fn new(tools: ToolRegistry) -> cv_core::Result<Self> {
        tools.require("ffmpeg")?;
        Ok(Self { tools })
    }
}

#[async_trait]
impl cv_core::MediaCutter for FfmpegCutter {
    async fn trim(&self, request: &TrimRequest) -> cv_core::Result<()> {
        actions::trim(&self.tools, request).await
    }

    async fn concat(&self, fragments: &[PathBuf], output: &Path) -> cv_core::Result<()> {
        actions::concat_fragments(&self.tools, fragments, output).await
    }
}
