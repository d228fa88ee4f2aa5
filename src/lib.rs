//! camvault - time-range playback and live following over a segmented
//! camera archive.
//!
//! This library crate exposes the binary's supporting modules for testing.

pub mod config;
pub mod sim;
pub mod timefmt;
