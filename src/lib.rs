

//! Compress a byte stream into a self-describing container
//! using per-chunk canonical Huffman coding,
//! with SHA-256 integrity verification at chunk and container level,
//! and a parallel worker pool with deterministic, in-order output.

#![warn(
    rust_2018_idioms,
    future_incompatible,
    unused_extern_crates,
    unused,

    missing_debug_implementations,
)]

#![deny(
    unused_variables,
    unused_assignments,
    dead_code,
    unused_must_use,
    trivial_numeric_casts,
)]

#![forbid(unsafe_code)]


pub mod io; // public to allow for custom container inspection tools

pub mod error;
pub mod bits;
pub mod frequency;
pub mod huffman;
pub mod codec;
pub mod digest;
pub mod meta;
pub mod metrics;
pub mod pipeline;


/// Re-exports of all types commonly required
/// for simply compressing and decompressing files.
pub mod prelude {

    // main exports
    pub use crate::pipeline::compress::{compress_path, compress_path_cancellable, compress_bytes};
    pub use crate::pipeline::decompress::{decompress_path, decompress_path_cancellable, decompress_bytes, verify_path};

    // configuration and observation
    pub use crate::pipeline::{CompressOptions, DecompressOptions, Operation, RunState};
    pub use crate::meta::{ContainerHeader, ChunkDescriptor, Layout};
    pub use crate::metrics::{MetricsRecorder, MetricsSink, Stage};

    // secondary modules
    pub use crate::error;
    pub use crate::error::{Error, Result};
    pub use crate::meta;
}
