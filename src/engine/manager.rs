//! The process-wide manager: one engine instance behind a reentrant lock,
//! stitching directory, resident set, stores and the platform facade into
//! the freeze/thaw cycle.
//!
//! All observable state transitions of a page are ordered by the engine lock.
//! The lock is taken from the fault handler too; nothing here parks, and the
//! handler performs only the bounded work laid out in [`Engine::service_fault`].

use std::fmt;
use std::io;
use std::ptr::NonNull;

use tracing::{debug, info, warn};

use crate::config::GhostConfig;
use crate::engine::directory::PageDirectory;
use crate::engine::resident::ResidentList;
use crate::engine::sync::ReentrantLock;
use crate::error::GhostError;
use crate::store::codec;
use crate::store::crypto::PageKey;
use crate::store::mem::InMemStore;
use crate::store::swap::SwapFile;
use crate::vm::{self, fault::FaultOutcome, PAGE_SIZE};

static ENGINE: ReentrantLock<Option<Engine>> = ReentrantLock::new(None);

/// Point-in-time engine counters, exposed through [`stats`].
#[derive(Debug, Default, Clone)]
pub struct GhostStats {
    pub resident_pages: usize,
    pub frozen_in_mem: usize,
    pub frozen_on_disk: usize,
    pub live_allocations: usize,
    pub faults_handled: u64,
    pub total_freezes: u64,
    pub total_thaws: u64,
    pub zombie_reclaims: u64,
    pub codec_failures: u64,
    pub io_failures: u64,
    /// Compressed bytes currently held by the in-memory store.
    pub mem_store_bytes: usize,
    pub swap_bytes_written: u64,
    pub swap_bytes_read: u64,
    /// Swap file length, dead space included.
    pub swap_file_len: u64,
}

impl fmt::Display for GhostStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ghostmem: {} resident, {} frozen ({} in RAM / {} on disk), \
             {} freezes / {} thaws, {} zombie reclaims, \
             swap {:.1} KB written / {:.1} KB read",
            self.resident_pages,
            self.frozen_in_mem + self.frozen_on_disk,
            self.frozen_in_mem,
            self.frozen_on_disk,
            self.total_freezes,
            self.total_thaws,
            self.zombie_reclaims,
            self.swap_bytes_written as f64 / 1024.0,
            self.swap_bytes_read as f64 / 1024.0,
        )
    }
}

struct Engine {
    config: GhostConfig,
    max_resident: usize,
    directory: PageDirectory,
    resident: ResidentList,
    mem_store: InMemStore,
    swap: Option<SwapFile>,
    key: Option<PageKey>,
    faults_handled: u64,
    total_freezes: u64,
    total_thaws: u64,
    zombie_reclaims: u64,
    codec_failures: u64,
    io_failures: u64,
}

/// Configure the engine and arm the fault hook. Must be called before the
/// first [`allocate`]; calling it again while initialized is an error.
pub fn init(config: GhostConfig) -> Result<(), GhostError> {
    // Hook first: a managed region must never exist without the trap armed.
    vm::fault::install();

    ENGINE.with(|slot| {
        if slot.is_some() {
            return Err(GhostError::Config("engine is already initialized".into()));
        }

        let swap = if config.use_disk_backing {
            let file = SwapFile::create(&config.disk_file_path).map_err(|e| {
                GhostError::Config(format!(
                    "cannot open swap file {}: {e}",
                    config.disk_file_path.display()
                ))
            })?;
            Some(file)
        } else {
            None
        };

        let key = if config.use_disk_backing && config.encrypt_disk_pages {
            Some(PageKey::generate()?)
        } else {
            None
        };

        let max_resident = config.effective_max_resident();
        info!(
            "ghostmem up: {} resident page budget, {} store{}{}",
            max_resident,
            if swap.is_some() { "disk" } else { "in-memory" },
            if swap.is_some() && config.compress_before_disk {
                ", compressed"
            } else {
                ""
            },
            if key.is_some() { ", encrypted" } else { "" },
        );

        *slot = Some(Engine {
            config,
            max_resident,
            directory: PageDirectory::new(),
            resident: ResidentList::new(),
            mem_store: InMemStore::new(),
            swap,
            key,
            faults_handled: 0,
            total_freezes: 0,
            total_thaws: 0,
            zombie_reclaims: 0,
            codec_failures: 0,
            io_failures: 0,
        });
        Ok(())
    })
}

/// Reserve `len` bytes (rounded up to whole pages) of managed memory. The
/// returned memory is untouchable RAM-wise until first access, which
/// materialises each page zero-filled.
pub fn allocate(len: usize) -> Result<NonNull<u8>, GhostError> {
    ENGINE.with(|slot| {
        let engine = slot
            .as_mut()
            .ok_or_else(|| GhostError::Config("initialize the engine before allocating".into()))?;

        let rounded = vm::round_up_pages(len);
        let base = vm::reserve(rounded)?;
        engine.directory.register_allocation(base, len, rounded);

        if engine.config.verbose_logging {
            debug!("reserved {} page(s) at {:#x}", rounded / PAGE_SIZE, base);
        }

        NonNull::new(base as *mut u8).ok_or_else(|| {
            GhostError::OutOfAddressSpace(io::Error::new(
                io::ErrorKind::Other,
                "reservation landed at the null page",
            ))
        })
    })
}

/// Release an allocation. A null pointer is a no-op; an untracked pointer is
/// logged and ignored. Frozen pages are dropped from the stores and their
/// slots released immediately; resident pages stay in the LRU with refcount
/// zero and the next eviction reclaims them without compression.
pub fn deallocate(ptr: *mut u8, len: usize) {
    if ptr.is_null() {
        return;
    }
    let base = ptr as usize;

    ENGINE.with(|slot| {
        let Some(engine) = slot.as_mut() else {
            warn!("deallocate({base:#x}) on an uninitialized engine; ignoring");
            return;
        };

        match engine.directory.release_allocation(base) {
            Ok((recorded_len, zeroed)) => {
                if recorded_len != len {
                    debug!(
                        "deallocate({base:#x}) size {len} differs from recorded {recorded_len}"
                    );
                }
                for page in zeroed {
                    if engine.resident.contains(page) {
                        // Zombie: committed but unreferenced. The next
                        // eviction sweep reclaims it without compressing.
                        if engine.config.verbose_logging {
                            debug!("page {page:#x} is now a zombie");
                        }
                        continue;
                    }
                    engine.release_slot(page);
                }
            }
            Err(GhostError::UnknownPointer(_)) => {
                warn!("deallocate of untracked pointer {base:#x}; ignoring");
            }
            Err(e) => warn!("deallocate({base:#x}) failed: {e}"),
        }
    })
}

/// Snapshot the engine counters. All zeros when the engine is down.
pub fn stats() -> GhostStats {
    ENGINE.with(|slot| slot.as_ref().map(Engine::snapshot).unwrap_or_default())
}

/// Drop all engine state: every extent is unmapped, the swap file is removed,
/// the key is zeroed. The fault hook stays installed (it is process-wide);
/// with no engine behind it, it chains to the previous disposition.
pub fn teardown() {
    ENGINE.with(|slot| {
        let Some(mut engine) = slot.take() else {
            return;
        };
        for (base, len) in engine.directory.drain_regions() {
            vm::release_region(base, len);
        }
        // SwapFile::drop removes the file, PageKey::drop zeroes the key.
        info!("ghostmem torn down");
    })
}

/// Entry point for the signal hook.
pub(crate) fn handle_fault(addr: usize) -> FaultOutcome {
    ENGINE.with(|slot| match slot.as_mut() {
        Some(engine) => engine.service_fault(addr),
        None => FaultOutcome::NotOurs,
    })
}

impl Engine {
    fn snapshot(&self) -> GhostStats {
        GhostStats {
            resident_pages: self.resident.len(),
            frozen_in_mem: self.mem_store.len(),
            frozen_on_disk: self.swap.as_ref().map_or(0, SwapFile::len),
            live_allocations: self.directory.live_allocations(),
            faults_handled: self.faults_handled,
            total_freezes: self.total_freezes,
            total_thaws: self.total_thaws,
            zombie_reclaims: self.zombie_reclaims,
            codec_failures: self.codec_failures,
            io_failures: self.io_failures,
            mem_store_bytes: self.mem_store.stored_bytes(),
            swap_bytes_written: self.swap.as_ref().map_or(0, SwapFile::bytes_written),
            swap_bytes_read: self.swap.as_ref().map_or(0, SwapFile::bytes_read),
            swap_file_len: self.swap.as_ref().map_or(0, SwapFile::file_len),
        }
    }

    /// Service one access violation. Bounded work only: resolve, make room,
    /// commit, restore, bookkeep.
    fn service_fault(&mut self, addr: usize) -> FaultOutcome {
        let Some(page) = self.directory.resolve_fault(addr) else {
            return FaultOutcome::NotOurs;
        };

        if self.resident.contains(page) {
            // Another thread rematerialised it (or an aborted freeze left it
            // committed) before we got the lock; the content is live.
            self.resident.mark_mru(page);
            return FaultOutcome::Handled;
        }

        self.evict_for(page);

        if vm::commit(page).is_err() {
            // Slot already gone — a use-after-release lands here. Treat it
            // like any other foreign access.
            return FaultOutcome::NotOurs;
        }

        if let Err(e) = self.restore_page(page) {
            match &e {
                GhostError::Io(_) => self.io_failures += 1,
                _ => self.codec_failures += 1,
            }
            warn!("restore of {page:#x} failed ({e}); page is zero-filled");
            unsafe { std::ptr::write_bytes(page as *mut u8, 0, PAGE_SIZE) };
        }

        self.resident.mark_mru(page);
        self.faults_handled += 1;
        if self.config.verbose_logging {
            debug!("fault at {addr:#x} serviced, {} resident", self.resident.len());
        }
        FaultOutcome::Handled
    }

    /// Make room before materialising `protected`, which must not be evicted.
    fn evict_for(&mut self, protected: usize) {
        while self.resident.len() >= self.max_resident {
            let Some(oldest) = self.resident.oldest() else {
                break;
            };
            let victim = if oldest == protected {
                match self.resident.second_oldest() {
                    Some(second) => second,
                    // Emergency brake: the protected page is the only
                    // resident one. Accept a one-page overshoot.
                    None => break,
                }
            } else {
                oldest
            };

            if self.directory.refcount(victim) == 0 {
                // Zombie shortcut: the last allocation on it is gone, there
                // is nothing worth compressing.
                self.zombie_reclaims += 1;
                if self.config.verbose_logging {
                    debug!("reclaiming zombie page {victim:#x}");
                }
                self.release_slot(victim);
                continue;
            }

            if !self.freeze_page(victim) {
                // Unfreezable victim stays resident; callers tolerate the
                // temporary overshoot.
                break;
            }
        }
    }

    /// Compress/encrypt one resident page into the active store and give its
    /// physical memory back. Returns false when the page had to stay resident.
    ///
    /// The page is write-protected for the duration so a concurrent writer
    /// faults and queues on the engine lock instead of racing the snapshot.
    fn freeze_page(&mut self, page: usize) -> bool {
        if vm::protect_read(page).is_err() {
            return false;
        }
        let bytes = unsafe { std::slice::from_raw_parts(page as *const u8, PAGE_SIZE) };

        if let Some(swap) = self.swap.as_mut() {
            let mut blob = if self.config.compress_before_disk {
                match codec::compress_page(bytes) {
                    Ok(blob) => blob,
                    Err(e) => {
                        self.codec_failures += 1;
                        warn!("cannot freeze {page:#x}: {e}");
                        let _ = vm::commit(page);
                        return false;
                    }
                }
            } else {
                bytes.to_vec()
            };
            // Compress-then-encrypt keeps the ciphertext high-entropy.
            if let Some(key) = self.key.as_ref() {
                key.apply(page, &mut blob);
            }
            if let Err(e) = swap.put(page, &blob) {
                self.io_failures += 1;
                warn!("swap write for {page:#x} failed: {e}");
                let _ = vm::commit(page);
                return false;
            }
        } else {
            let blob = match codec::compress_page(bytes) {
                Ok(blob) => blob,
                Err(e) => {
                    self.codec_failures += 1;
                    warn!("cannot freeze {page:#x}: {e}");
                    let _ = vm::commit(page);
                    return false;
                }
            };
            self.mem_store.put(page, blob);
        }

        self.total_freezes += 1;
        self.resident.remove(page);
        vm::decommit(page);
        if self.config.verbose_logging {
            debug!("froze page {page:#x}");
        }
        true
    }

    /// Fill a freshly committed page: thaw it from the active store, or
    /// zero-fill on first touch.
    fn restore_page(&mut self, page: usize) -> Result<(), GhostError> {
        let dst = unsafe { std::slice::from_raw_parts_mut(page as *mut u8, PAGE_SIZE) };

        if let Some(blob) = self.mem_store.take(page) {
            let bytes = codec::decompress_page(&blob)?;
            dst.copy_from_slice(&bytes);
            self.total_thaws += 1;
            return Ok(());
        }

        if let Some(swap) = self.swap.as_mut() {
            if swap.contains(page) {
                let mut blob = swap.get(page)?;
                if let Some(key) = self.key.as_ref() {
                    key.apply(page, &mut blob);
                }
                if self.config.compress_before_disk {
                    let bytes = codec::decompress_page(&blob)?;
                    dst.copy_from_slice(&bytes);
                } else {
                    if blob.len() != PAGE_SIZE {
                        return Err(GhostError::Codec(format!(
                            "swap blob for {page:#x} is {} bytes",
                            blob.len()
                        )));
                    }
                    dst.copy_from_slice(&blob);
                }
                self.total_thaws += 1;
                return Ok(());
            }
        }

        // First touch of a reserved page.
        dst.fill(0);
        Ok(())
    }

    /// Final release of a page slot: drop any frozen copy, give the physical
    /// memory back, and unmap the extent once its last page is gone.
    fn release_slot(&mut self, page: usize) {
        self.mem_store.discard(page);
        if let Some(swap) = self.swap.as_mut() {
            swap.discard(page);
        }
        self.resident.remove(page);
        vm::decommit(page);
        if let Some((base, len)) = self.directory.forget_page(page) {
            vm::release_region(base, len);
            if self.config.verbose_logging {
                debug!("released extent {base:#x} (+{len} bytes)");
            }
        }
    }
}
