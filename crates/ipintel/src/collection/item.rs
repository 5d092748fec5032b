//! Borrowed/owned record bytes returned by collections.

use std::ops::Range;
use std::sync::Arc;

use crate::cache::CachePin;

/// One record fetched from a collection.
///
/// Whatever the backing store, an `Item` dereferences to the record's bytes.
/// Dropping it releases the underlying resource (a cache pin, an owned
/// buffer, or a view into the shared memory region), so there is no
/// explicit release call to forget.
pub enum Item {
    /// View into a shared in-memory region.
    Shared { data: Arc<[u8]>, range: Range<usize> },
    /// Bytes read from the file for this request alone.
    Owned(Vec<u8>),
    /// Pinned cache entry.
    Cached(CachePin),
}

impl Item {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Item::Shared { data, range } => &data[range.clone()],
            Item::Owned(bytes) => bytes,
            Item::Cached(pin) => pin.bytes(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Copies the record out, dropping any pin it held.
    pub fn into_vec(self) -> Vec<u8> {
        match self {
            Item::Shared { data, range } => data[range].to_vec(),
            Item::Owned(bytes) => bytes,
            Item::Cached(pin) => pin.bytes().to_vec(),
        }
    }
}

impl std::ops::Deref for Item {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl std::fmt::Debug for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Item::Shared { .. } => "shared",
            Item::Owned(_) => "owned",
            Item::Cached(_) => "cached",
        };
        write!(f, "Item({kind}, {} bytes)", self.len())
    }
}
