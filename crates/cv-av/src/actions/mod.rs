//! Stream-copy media actions: windowed trim and concat-demuxer merge.

mod concat;
mod trim;

pub use concat::{concat_fragments, concat_list};
pub use trim::{trim, trim_args};
