//! Version information, queryable at runtime.

/// Crate version as `"major.minor.patch"`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const VERSION_MAJOR: u32 = 1;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 0;

/// Version encoded as `major * 10000 + minor * 100 + patch`.
pub const fn version_number() -> u32 {
    VERSION_MAJOR * 10000 + VERSION_MINOR * 100 + VERSION_PATCH
}
