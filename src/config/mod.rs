pub use cv_core::config::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default config locations, tried in order.
const DEFAULT_PATHS: &[&str] = &[
    "./camvault.toml",
    "~/.config/camvault/config.toml",
    "/etc/camvault/config.toml",
];

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    expand_paths(&mut config);

    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_PATHS {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    tracing::debug!("No config file found, using defaults");
    Ok(Config::default())
}

/// Expand `~` in every configured directory.
fn expand_paths(config: &mut Config) {
    config.archive.dir = expand(&config.archive.dir);
    config.clips.output_dir = config.clips.output_dir.as_deref().map(expand);
    config.clips.scratch_dir = config.clips.scratch_dir.as_deref().map(expand);
    config.tools.ffmpeg_path = config.tools.ffmpeg_path.as_deref().map(expand);
    config.tools.ffprobe_path = config.tools.ffprobe_path.as_deref().map(expand);
}

fn expand(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).as_ref()),
        None => path.to_path_buf(),
    }
}
