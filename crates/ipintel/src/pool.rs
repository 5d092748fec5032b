//! Fixed-size pool of open read-only file handles.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::{Error, Result};

/// Packs a 1-based slot index and an ABA tag into one atomic word.
///
/// Index 0 is the empty sentinel; the tag advances on every successful pop
/// and push so a slot that is released and re-acquired between another
/// thread's load and compare-exchange cannot be mistaken for untouched.
fn pack(index: u16, tag: u16) -> u32 {
    u32::from(index) | (u32::from(tag) << 16)
}

fn unpack(word: u32) -> (u16, u16) {
    (word as u16, (word >> 16) as u16)
}

/// A lock-free stack of `N` open read-only handles on one source file.
///
/// `get` pops a handle and `release` (the guard's drop) pushes it back.
/// When every handle is out, `get` fails fast with
/// [`Error::InsufficientHandles`]; the pool never blocks.
///
/// Each slot carries its own mutex purely to hand out `&mut File`; the
/// mutex is uncontended by construction because the index stack grants
/// exclusive ownership of the popped slot.
pub struct FileHandlePool {
    path: PathBuf,
    head: AtomicU32,
    next: Vec<AtomicU32>,
    slots: Vec<Mutex<File>>,
}

impl FileHandlePool {
    /// Opens `count` read-only handles on `path`.
    pub fn open(path: &Path, count: u16) -> Result<FileHandlePool> {
        if count == 0 {
            return Err(Error::InvalidCollectionConfig(
                "file handle pool requires at least one handle",
            ));
        }
        let mut slots = Vec::with_capacity(usize::from(count));
        let mut next = Vec::with_capacity(usize::from(count));
        for i in 0..count {
            let file = File::open(path).map_err(|e| Error::from_io_for_path(e, path))?;
            slots.push(Mutex::new(file));
            // Free list threads every slot: i -> i+1, last -> sentinel.
            let following = if i + 1 < count { u32::from(i) + 2 } else { 0 };
            next.push(AtomicU32::new(following));
        }
        log::debug!("opened {count} file handles on {}", path.display());
        Ok(FileHandlePool {
            path: path.to_path_buf(),
            head: AtomicU32::new(pack(1, 0)),
            next,
            slots,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Pops a handle, failing fast when the pool is exhausted.
    pub fn get(&self) -> Result<PooledFile<'_>> {
        let mut head = self.head.load(Ordering::SeqCst);
        loop {
            let (index, tag) = unpack(head);
            if index == 0 {
                return Err(Error::InsufficientHandles);
            }
            let slot = usize::from(index) - 1;
            let following = self.next[slot].load(Ordering::SeqCst);
            let replacement = pack(following as u16, tag.wrapping_add(1));
            match self.head.compare_exchange_weak(
                head,
                replacement,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    let guard = match self.slots[slot].try_lock() {
                        Ok(guard) => guard,
                        Err(_) => {
                            self.push(index);
                            return Err(Error::CollectionFailure(
                                "popped pool slot was not exclusive".into(),
                            ));
                        }
                    };
                    return Ok(PooledFile {
                        pool: self,
                        index,
                        guard: Some(guard),
                    });
                }
                Err(current) => head = current,
            }
        }
    }

    fn push(&self, index: u16) {
        let slot = usize::from(index) - 1;
        let mut head = self.head.load(Ordering::SeqCst);
        loop {
            let (current_index, tag) = unpack(head);
            self.next[slot].store(u32::from(current_index), Ordering::SeqCst);
            let replacement = pack(index, tag.wrapping_add(1));
            match self.head.compare_exchange_weak(
                head,
                replacement,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return,
                Err(current) => head = current,
            }
        }
    }
}

impl std::fmt::Debug for FileHandlePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandlePool")
            .field("path", &self.path)
            .field("capacity", &self.slots.len())
            .finish()
    }
}

/// An exclusively held pool handle; returns itself to the pool on drop.
#[derive(Debug)]
pub struct PooledFile<'a> {
    pool: &'a FileHandlePool,
    index: u16,
    guard: Option<std::sync::MutexGuard<'a, File>>,
}

impl PooledFile<'_> {
    /// Positions the handle and fills `buf` exactly.
    pub fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let file = self
            .guard
            .as_deref_mut()
            .ok_or(Error::NullPointer("pooled file guard"))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(Error::CollectionFileSeekFail)?;
        file.read_exact(buf).map_err(Error::CollectionFileReadFail)
    }
}

impl Drop for PooledFile<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.pool.push(self.index);
    }
}
