//! Virtual RAM through transparent compression.
//!
//! `ghostmem` hands out pointers into large reserved regions while keeping
//! only a small bounded set of pages physically resident. Pages that fall off
//! the LRU are compressed with LZ4 into an in-memory store, or optionally
//! written (ChaCha20-encrypted if asked) to an append-only swap file. The
//! next access faults, and the engine quietly commits, thaws and resumes.
//!
//! ```no_run
//! use ghostmem::{GhostBuf, GhostConfig};
//!
//! ghostmem::init(GhostConfig::default())?;
//!
//! let mut buf = GhostBuf::new(64 * 1024)?;
//! buf[0] = 7; // fault → commit → zero-fill, all behind the scenes
//! assert_eq!(buf[0], 7);
//! # Ok::<(), ghostmem::GhostError>(())
//! ```
//!
//! The engine is a process-wide singleton because the fault hook is a
//! process-wide resource; [`init`] must run before the first [`allocate`] so
//! no managed region ever exists with the trap unarmed.

mod buf;
mod config;
mod engine;
mod error;
mod store;
mod version;
mod vm;

pub use buf::GhostBuf;
pub use config::GhostConfig;
pub use engine::manager::{allocate, deallocate, init, stats, teardown, GhostStats};
pub use error::GhostError;
pub use version::{version_number, VERSION, VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH};
pub use vm::{DEFAULT_MAX_RESIDENT_PAGES, PAGE_SIZE};
