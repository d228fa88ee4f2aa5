//! Fragment concatenation using ffmpeg's concat demuxer with `-c copy`.

use std::path::{Path, PathBuf};

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Name of the list file written next to the fragments.
const LIST_FILE: &str = "concat.txt";

/// Render a concat-demuxer list for `fragments`.
///
/// Paths are absolute (hence `-safe 0`) and single quotes are escaped the
/// way the demuxer expects (`'\''`).
pub fn concat_list(fragments: &[PathBuf]) -> String {
    fragments
        .iter()
        .map(|p| {
            let escaped = p.to_string_lossy().replace('\'', r"'\''");
            format!("file '{escaped}'\n")
        })
        .collect()
}

/// Merge `fragments`, in order, into `output` without re-encoding.
///
/// The list file is written into the first fragment's directory, which is
/// expected to be the caller's scratch area.
pub async fn concat_fragments(
    tools: &ToolRegistry,
    fragments: &[PathBuf],
    output: &Path,
) -> cv_core::Result<()> {
    let ffmpeg = tools.require("ffmpeg")?;

    let Some(list_dir) = fragments.first().and_then(|p| p.parent()) else {
        return Err(cv_core::Error::tool("ffmpeg", "concat called with no fragments"));
    };
    let list_path = list_dir.join(LIST_FILE);
    tokio::fs::write(&list_path, concat_list(fragments)).await?;

    tracing::info!("concat {} fragments -> {:?}", fragments.len(), output);

    let mut cmd = ToolCommand::new(ffmpeg.path.clone());
    cmd.timeout(ffmpeg.timeout);
    cmd.args(["-y", "-nostdin", "-f", "concat", "-safe", "0", "-i"]);
    cmd.path_arg(&list_path);
    cmd.args(["-map", "0", "-c", "copy", "-movflags", "+faststart"]);
    cmd.path_arg(output);
    cmd.execute().await?;

    Ok(())
}
