//! # cv-av
//!
//! External tool plumbing for camvault.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support; children die with their future.
//! - **Scratch areas** ([`ScratchArea`]) -- uniquely named temporary
//!   directories removed on every exit path.
//! - **Duration probing** ([`FfprobeDurationProbe`]) -- implements
//!   [`cv_core::DurationProbe`].
//! - **Cutting** ([`FfmpegCutter`], [`actions`]) -- stream-copy trim and
//!   concat, implementing [`cv_core::MediaCutter`].

pub mod actions;
pub mod command;
pub mod cutter;
pub mod probe;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use cutter::FfmpegCutter;
pub use probe::FfprobeDurationProbe;
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use workspace::ScratchArea;
