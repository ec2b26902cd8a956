//! Reentrant engine lock.
//!
//! The fault handler can run on any thread, including one that is already
//! inside the engine: a commit performed while servicing one fault may itself
//! fault. The lock therefore tracks its owning thread and admits nested
//! acquisition. It spins rather than parking because it has to be taken from
//! a signal handler, where blocking primitives are off the table.

use std::cell::UnsafeCell;
use std::hint;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct ReentrantLock<T> {
    /// `pthread_self()` of the holder; 0 when free.
    owner: AtomicUsize,
    depth: UnsafeCell<usize>,
    value: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for ReentrantLock<T> {}
unsafe impl<T: Send> Sync for ReentrantLock<T> {}

impl<T> ReentrantLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            owner: AtomicUsize::new(0),
            depth: UnsafeCell::new(0),
            value: UnsafeCell::new(value),
        }
    }

    fn self_id() -> usize {
        // A register read on every major libc; safe in signal context and
        // needs no thread-local initialisation.
        unsafe { libc::pthread_self() as usize }
    }

    /// Run `f` with exclusive access to the value. Nested calls from the
    /// owning thread are admitted. Callers must not stash references into the
    /// value across operations that can fault back into the engine.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let me = Self::self_id();
        if self.owner.load(Ordering::Acquire) != me {
            while self
                .owner
                .compare_exchange_weak(0, me, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                hint::spin_loop();
            }
        }

        // Depth is only ever touched by the owning thread.
        unsafe { *self.depth.get() += 1 };

        struct Release<'a> {
            owner: &'a AtomicUsize,
            depth: *mut usize,
        }
        impl Drop for Release<'_> {
            fn drop(&mut self) {
                unsafe {
                    *self.depth -= 1;
                    if *self.depth == 0 {
                        self.owner.store(0, Ordering::Release);
                    }
                }
            }
        }
        let _release = Release {
            owner: &self.owner,
            depth: self.depth.get(),
        };

        f(unsafe { &mut *self.value.get() })
    }
}
