//! Windowed stream-copy trimming using ffmpeg `-c copy`.

use std::time::Duration;

use cv_core::TrimRequest;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Format a duration as ffmpeg seconds with millisecond precision.
pub(crate) fn ffmpeg_secs(d: Duration) -> String {
    format!("{:.3}", d.as_secs_f64())
}

/// Build the ffmpeg argument list for a trim request.
///
/// `-ss` is given before `-i` so ffmpeg seeks the input: with stream copy
/// the cut lands on the keyframe at or before the requested offset.
pub fn trim_args(request: &TrimRequest) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".into(), "-nostdin".into()];

    if !request.start.is_zero() {
        args.push("-ss".into());
        args.push(ffmpeg_secs(request.start));
    }

    args.push("-i".into());
    args.push(request.input.to_string_lossy().to_string());

    if let Some(duration) = request.duration {
        args.push("-t".into());
        args.push(ffmpeg_secs(duration));
    }

    args.extend(
        ["-map", "0", "-c", "copy", "-avoid_negative_ts", "make_zero"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.push(request.output.to_string_lossy().to_string());
    args
}

/// Cut `request.input` into `request.output` without re-encoding.
pub async fn trim(tools: &ToolRegistry, request: &TrimRequest) -> cv_core::Result<()> {
    let ffmpeg = tools.require("ffmpeg")?;

    tracing::info!(
        "trim {:?} @{} for {} -> {:?}",
        request.input,
        ffmpeg_secs(request.start),
        request
            .duration
            .map(ffmpeg_secs)
            .unwrap_or_else(|| "EOF".into()),
        request.output
    );

    let mut cmd = ToolCommand::new(ffmpeg.path.clone());
    cmd.timeout(ffmpeg.timeout);
    cmd.args(trim_args(request));
    cmd.execute().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    fn request(start: u64, duration: Option<u64>) -> TrimRequest {
        TrimRequest {
            input: PathBuf::from("/videos/CAM_USB-20251104-143000.mp4"),
            start: Duration::from_secs(start),
            duration: duration.map(Duration::from_secs),
            output: PathBuf::from("/tmp/out.mp4"),
        }
    }

    #[test]
    fn window_seeks_input_and_limits_duration() {
        let args = trim_args(&request(60, Some(480)));
        let joined = args.join(" ");
        assert!(joined.starts_with("-y -nostdin -ss 60.000 -i /videos/"), "{joined}");
        assert!(joined.contains("-t 480.000"), "{joined}");
        assert!(joined.contains("-c copy"), "{joined}");
        assert_eq!(args.last().unwrap(), "/tmp/out.mp4");
    }

    #[test]
    fn to_end_omits_duration() {
        let args = trim_args(&request(90, None));
        assert!(args.contains(&"-ss".to_string()));
        assert!(!args.contains(&"-t".to_string()));
    }

    #[test]
    fn whole_file_has_no_seek() {
        let req = TrimRequest::whole(Path::new("/videos/a.mp4"), Path::new("/tmp/1.mp4"));
        let args = trim_args(&req);
        assert!(!args.contains(&"-ss".to_string()));
        assert!(!args.contains(&"-t".to_string()));
    }

    #[test]
    fn subsecond_precision() {
        assert_eq!(ffmpeg_secs(Duration::from_millis(1500)), "1.500");
    }

    #[tokio::test]
    async fn trim_without_ffmpeg_fails() {
        let err = trim(&ToolRegistry::default(), &request(0, None))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ffmpeg"));
    }
}
