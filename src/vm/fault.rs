//! Process-wide fault hook.
//!
//! Installed once, before the first region is reserved: a managed page must
//! never be reachable without the trap armed. SIGSEGV and SIGBUS are both
//! hooked (Linux raises SIGSEGV for protection faults, macOS raises SIGBUS),
//! with `SA_NODEFER` so a fault taken inside the handler itself still reaches
//! us — the engine lock is reentrant for exactly that case.
//!
//! Faults the engine does not own are chained to whatever handler was there
//! before us; if that was the default disposition, it is put back and the
//! retried instruction dies under it. The engine never masks foreign faults.

use std::cell::UnsafeCell;
use std::mem;
use std::sync::Once;

use crate::engine::manager;

/// Outcome of offering a faulting address to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// The engine owns the page and materialised it; retry the instruction.
    Handled,
    /// Not a managed address; the previous disposition decides.
    NotOurs,
}

struct SavedAction(UnsafeCell<Option<libc::sigaction>>);

// Written once under `INSTALL`, read only from the handler afterwards.
unsafe impl Sync for SavedAction {}

static INSTALL: Once = Once::new();
static PREV_SEGV: SavedAction = SavedAction(UnsafeCell::new(None));
static PREV_BUS: SavedAction = SavedAction(UnsafeCell::new(None));

/// Install the hook. Idempotent; uninstallation is not part of the contract.
pub fn install() {
    INSTALL.call_once(|| unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = handler as usize;
        action.sa_flags = libc::SA_SIGINFO | libc::SA_NODEFER;
        libc::sigemptyset(&mut action.sa_mask);

        let mut prev: libc::sigaction = mem::zeroed();
        libc::sigaction(libc::SIGSEGV, &action, &mut prev);
        *PREV_SEGV.0.get() = Some(prev);

        let mut prev: libc::sigaction = mem::zeroed();
        libc::sigaction(libc::SIGBUS, &action, &mut prev);
        *PREV_BUS.0.get() = Some(prev);
    });
}

extern "C" fn handler(sig: libc::c_int, info: *mut libc::siginfo_t, ctx: *mut libc::c_void) {
    let addr = faulting_address(info);
    if manager::handle_fault(addr) == FaultOutcome::Handled {
        return;
    }
    unsafe { chain_previous(sig, info, ctx) };
}

#[cfg(target_os = "linux")]
fn faulting_address(info: *mut libc::siginfo_t) -> usize {
    unsafe { (*info).si_addr() as usize }
}

#[cfg(not(target_os = "linux"))]
fn faulting_address(info: *mut libc::siginfo_t) -> usize {
    unsafe { (*info).si_addr as usize }
}

unsafe fn chain_previous(sig: libc::c_int, info: *mut libc::siginfo_t, ctx: *mut libc::c_void) {
    let prev = match sig {
        libc::SIGSEGV => *PREV_SEGV.0.get(),
        libc::SIGBUS => *PREV_BUS.0.get(),
        _ => None,
    };

    match prev {
        Some(prev) if prev.sa_sigaction == libc::SIG_IGN => {}
        Some(prev) if prev.sa_sigaction != libc::SIG_DFL => {
            if prev.sa_flags & libc::SA_SIGINFO != 0 {
                let f: extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void) =
                    mem::transmute(prev.sa_sigaction);
                f(sig, info, ctx);
            } else {
                let f: extern "C" fn(libc::c_int) = mem::transmute(prev.sa_sigaction);
                f(sig);
            }
        }
        _ => {
            // Default disposition: restore it and let the retried instruction
            // terminate the process the normal way.
            let mut dfl: libc::sigaction = mem::zeroed();
            dfl.sa_sigaction = libc::SIG_DFL;
            libc::sigemptyset(&mut dfl.sa_mask);
            libc::sigaction(sig, &dfl, std::ptr::null_mut());
        }
    }
}
