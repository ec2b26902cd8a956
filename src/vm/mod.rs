//! Platform virtual-memory facade.
//!
//! One page moves through reserve → commit → decommit over its life:
//!
//! ```text
//! reserve ──► commit ──► (in use) ──► decommit ──► commit ...
//!    │           │                        │
//!    │           │                        └── madvise(MADV_DONTNEED) + mprotect(PROT_NONE)
//!    │           └── mprotect(PROT_READ | PROT_WRITE)
//!    └── mmap(PROT_NONE, MAP_NORESERVE)
//! ```
//!
//! Reserved and decommitted pages fault on access; the hook in [`fault`]
//! turns those faults into freeze/thaw traffic. Content of a page that was
//! decommitted and committed again is never trusted — the engine rewrites
//! the full 4096 bytes on every restore.

#[cfg(not(unix))]
compile_error!("ghostmem drives mmap/mprotect/sigaction and requires a Unix-like target");

pub mod fault;

use std::io;

use tracing::warn;

use crate::error::GhostError;

/// Managed page granularity. Platforms with a different native page size are
/// unsupported by design.
pub const PAGE_SIZE: usize = 4096;

/// Resident-set bound used when the config leaves `max_resident_pages` at 0.
pub const DEFAULT_MAX_RESIDENT_PAGES: usize = 5;

/// Page-aligned base address containing `addr`.
pub fn page_base(addr: usize) -> usize {
    addr & !(PAGE_SIZE - 1)
}

/// Round `len` up to a whole number of pages, minimum one.
pub fn round_up_pages(len: usize) -> usize {
    (len.saturating_add(PAGE_SIZE - 1) & !(PAGE_SIZE - 1)).max(PAGE_SIZE)
}

#[cfg(target_os = "linux")]
const RESERVE_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE;
#[cfg(not(target_os = "linux"))]
const RESERVE_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANON;

/// Reserve `len` bytes of address space with no access and no physical
/// backing. Every page in the range faults until committed.
pub fn reserve(len: usize) -> Result<usize, GhostError> {
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_NONE,
            RESERVE_FLAGS,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(GhostError::OutOfAddressSpace(io::Error::last_os_error()));
    }
    Ok(ptr as usize)
}

/// Make one page readable and writable.
pub fn commit(page: usize) -> Result<(), GhostError> {
    let rc = unsafe {
        libc::mprotect(
            page as *mut libc::c_void,
            PAGE_SIZE,
            libc::PROT_READ | libc::PROT_WRITE,
        )
    };
    if rc != 0 {
        return Err(GhostError::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// Write-protect one committed page. Concurrent writers fault and queue on
/// the engine lock, which is what makes a freeze snapshot consistent.
pub fn protect_read(page: usize) -> Result<(), GhostError> {
    let rc = unsafe { libc::mprotect(page as *mut libc::c_void, PAGE_SIZE, libc::PROT_READ) };
    if rc != 0 {
        return Err(GhostError::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// Give one page's physical storage back to the OS and re-arm the fault.
pub fn decommit(page: usize) {
    unsafe {
        if libc::madvise(page as *mut libc::c_void, PAGE_SIZE, libc::MADV_DONTNEED) != 0 {
            warn!(
                "madvise(MADV_DONTNEED) on {:#x} failed: {}",
                page,
                io::Error::last_os_error()
            );
        }
        if libc::mprotect(page as *mut libc::c_void, PAGE_SIZE, libc::PROT_NONE) != 0 {
            warn!(
                "mprotect(PROT_NONE) on {:#x} failed: {}",
                page,
                io::Error::last_os_error()
            );
        }
    }
}

/// Return a whole reservation to the OS.
pub fn release_region(base: usize, len: usize) {
    unsafe {
        if libc::munmap(base as *mut libc::c_void, len) != 0 {
            warn!(
                "munmap({:#x}, {}) failed: {}",
                base,
                len,
                io::Error::last_os_error()
            );
        }
    }
}
