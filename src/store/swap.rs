//! Append-only swap file with an in-memory offset index.
//!
//! The file is a raw concatenation of variable-length blobs in freeze order —
//! no header, no on-disk index. The in-memory index is authoritative and dies
//! with the process, so the file is scratch and is deleted on drop. A re-
//! freeze of the same page appends a fresh blob and re-points the index; the
//! superseded bytes are never reclaimed.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Location of one frozen page inside the swap file.
#[derive(Debug, Clone, Copy)]
struct SwapSlot {
    offset: u64,
    len: usize,
}

pub struct SwapFile {
    path: PathBuf,
    file: File,
    /// Next append position.
    cursor: u64,
    slots: HashMap<usize, SwapSlot>,
    bytes_written: u64,
    bytes_read: u64,
}

impl SwapFile {
    /// Create (or truncate) the swap file at `path`.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        debug!("swap file ready at {:?}", path);

        Ok(Self {
            path: path.to_path_buf(),
            file,
            cursor: 0,
            slots: HashMap::new(),
            bytes_written: 0,
            bytes_read: 0,
        })
    }

    /// Append `blob` and point the page's index entry at it. Any earlier blob
    /// for the same page becomes dead space.
    pub fn put(&mut self, page: usize, blob: &[u8]) -> io::Result<()> {
        let offset = self.cursor;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(blob)?;
        self.cursor += blob.len() as u64;
        self.bytes_written += blob.len() as u64;
        self.slots.insert(
            page,
            SwapSlot {
                offset,
                len: blob.len(),
            },
        );
        Ok(())
    }

    /// Read a page's blob back. The index entry is retained; the slot stays
    /// valid until the page is released or frozen again.
    pub fn get(&mut self, page: usize) -> io::Result<Vec<u8>> {
        let slot = self.slots.get(&page).copied().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("page {page:#x} not in swap"),
            )
        })?;

        let mut blob = vec![0u8; slot.len];
        self.file.seek(SeekFrom::Start(slot.offset))?;
        self.file.read_exact(&mut blob)?;
        self.bytes_read += slot.len as u64;
        Ok(blob)
    }

    /// Drop the index entry; file space is not reclaimed.
    pub fn discard(&mut self, page: usize) {
        self.slots.remove(&page);
    }

    pub fn contains(&self, page: usize) -> bool {
        self.slots.contains_key(&page)
    }

    /// Number of indexed pages.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Bytes the file has grown to, dead space included.
    pub fn file_len(&self) -> u64 {
        self.cursor
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SwapFile {
    fn drop(&mut self) {
        // Scratch data keyed by this process's address map; it must not
        // outlive the process.
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("could not remove swap file {:?}: {}", self.path, e);
        }
    }
}
