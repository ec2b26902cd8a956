//! Error types for the ghostmem engine.

use std::io;

use thiserror::Error;

/// Everything that can go wrong inside the engine.
///
/// Codec and I/O failures during eviction are not surfaced through the public
/// API at all: the victim page simply stays resident and the engine logs the
/// incident. The variants exist so internal plumbing can propagate with `?`
/// and so init/allocate can report their failures precisely.
#[derive(Debug, Error)]
pub enum GhostError {
    /// Bad configuration: unusable swap path, re-initialization, or use
    /// before init.
    #[error("configuration error: {0}")]
    Config(String),

    /// The OS refused to reserve address space.
    #[error("address space reservation failed: {0}")]
    OutOfAddressSpace(io::Error),

    /// The compressor produced no output or could not reconstruct a page.
    #[error("codec error: {0}")]
    Codec(String),

    /// Swap file read or write failed.
    #[error("swap I/O error: {0}")]
    Io(#[from] io::Error),

    /// Deallocate was handed a pointer the directory does not know.
    #[error("unknown pointer {0:#x}")]
    UnknownPointer(usize),

    /// A fault outside every managed region; the default handler decides.
    #[error("fault at {0:#x} is outside managed memory")]
    ForeignFault(usize),
}
