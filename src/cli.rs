use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use camvault::timefmt::parse_time;

#[derive(Parser)]
#[command(name = "camvault")]
#[command(author, version, about = "Time-range clips and live-tail playback over a camera archive")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List archive segments, oldest first
    List {
        /// Probe each segment's duration with ffprobe
        #[arg(long)]
        probe: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which segment pieces cover a time range
    Resolve {
        /// Range start (YYYY-MM-DD HH:MM:SS or YYYYMMDD-HHMMSS)
        #[arg(long, value_parser = parse_time)]
        start: NaiveDateTime,

        /// Range end, exclusive
        #[arg(long, value_parser = parse_time)]
        end: NaiveDateTime,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Assemble a playable clip for a time range
    Clip {
        /// Range start (YYYY-MM-DD HH:MM:SS or YYYYMMDD-HHMMSS)
        #[arg(long, value_parser = parse_time)]
        start: NaiveDateTime,

        /// Range end, exclusive
        #[arg(long, value_parser = parse_time)]
        end: NaiveDateTime,

        /// Move the finished clip here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the live tail segment
    Live {
        /// Follow the live tail with a simulated player until Ctrl-C
        #[arg(long)]
        follow: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
