//! cv-core: shared types, IDs, errors, configuration, and events.
//!
//! This crate is the foundational dependency for the other cv-* crates,
//! providing the archive domain types ([`Segment`], [`TimeRange`],
//! [`ResolvedSpan`], [`Clip`]), a unified error type, application
//! configuration, a broadcast event bus, and the collaborator traits
//! implemented by external tooling ([`DurationProbe`], [`MediaCutter`]).

pub mod config;
pub mod cutter;
pub mod error;
pub mod events;
pub mod ids;
pub mod probe;
pub mod segment;

// Re-export the most commonly used items at the crate root.
pub use cutter::{MediaCutter, TrimRequest};
pub use error::{Boundary, Error, Result};
pub use ids::*;
pub use probe::DurationProbe;
pub use segment::*;
