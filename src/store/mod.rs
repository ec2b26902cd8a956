//! Backing stores and the freeze pipeline pieces: LZ4 codec, ChaCha20
//! keystream, the in-RAM blob map, and the append-only swap file.

pub mod codec;
pub mod crypto;
pub mod mem;
pub mod swap;
