//! cv-timeline: the segment timeline engine.
//!
//! Turns a directory of rotated camera segments into a continuous,
//! seekable timeline:
//!
//! - [`SegmentCatalog`] lists the archive, oldest first.
//! - [`TimeRangeResolver`] maps a wall-clock range onto segment pieces.
//! - [`ClipAssembler`] cuts and merges those pieces into one clip.
//! - [`LiveTailSelector`] picks the newest segment that is safe to play.
//! - [`LiveReconciler`] keeps playback pinned to the live tail.
//! - [`PlaybackController`] runs all of it from one control loop.

pub mod assembler;
pub mod catalog;
pub mod controller;
pub mod engine;
pub mod live;
pub mod reconciler;
pub mod resolver;
pub mod scrub;
pub mod supersede;

#[cfg(test)]
mod testing;

pub use assembler::ClipAssembler;
pub use catalog::SegmentCatalog;
pub use controller::{
    command_channel, ControlCommand, ControllerHandle, ControllerSettings, PlaybackController,
    PlaybackServices,
};
pub use engine::{EngineEvent, PlaybackEngine, PlaybackUri};
pub use live::{FileLockProbe, LiveTailSelector, LockProbe};
pub use reconciler::{LiveReconciler, LiveState, LiveUpdate};
pub use resolver::TimeRangeResolver;
pub use scrub::{ProgressThrottle, SeekGate, Transport};
pub use supersede::{RequestSlot, Ticket};
