//! Fixed-capacity sharded LRU cache with pinned entries.
//!
//! Keys are hashed to 64 bits; the hash picks a shard and keys an ordered
//! tree inside it. Each shard owns a bounded node pool and a doubly-linked
//! LRU list threaded through the pool by index. An entry handed out to a
//! caller is *pinned*: it leaves the LRU list until its last pin drops, so
//! it can never be chosen as an eviction victim while in use.

use std::collections::BTreeMap;
use std::hash::{BuildHasher, RandomState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::{Error, Result};

/// Loads the bytes for a missing key.
pub type CacheLoader = Box<dyn Fn(u32) -> Result<Vec<u8>> + Send + Sync>;

const NIL: u32 = u32::MAX;

struct Node {
    hash: i64,
    key: u32,
    data: Arc<[u8]>,
    active: u32,
    prev: u32,
    next: u32,
}

struct Shard {
    nodes: Vec<Node>,
    /// Ordered by the 64-bit hash; the key disambiguates collisions.
    tree: BTreeMap<(i64, u32), u32>,
    lru_head: u32,
    lru_tail: u32,
}

impl Shard {
    fn new() -> Shard {
        Shard {
            nodes: Vec::new(),
            tree: BTreeMap::new(),
            lru_head: NIL,
            lru_tail: NIL,
        }
    }

    fn unlink(&mut self, index: u32) {
        let (prev, next) = {
            let node = &self.nodes[index as usize];
            (node.prev, node.next)
        };
        match prev {
            NIL => self.lru_head = next,
            p => self.nodes[p as usize].next = next,
        }
        match next {
            NIL => self.lru_tail = prev,
            n => self.nodes[n as usize].prev = prev,
        }
        let node = &mut self.nodes[index as usize];
        node.prev = NIL;
        node.next = NIL;
    }

    fn push_head(&mut self, index: u32) {
        let old_head = self.lru_head;
        {
            let node = &mut self.nodes[index as usize];
            node.prev = NIL;
            node.next = old_head;
        }
        match old_head {
            NIL => self.lru_tail = index,
            h => self.nodes[h as usize].prev = index,
        }
        self.lru_head = index;
    }

    fn push_tail(&mut self, index: u32) {
        let old_tail = self.lru_tail;
        {
            let node = &mut self.nodes[index as usize];
            node.next = NIL;
            node.prev = old_tail;
        }
        match old_tail {
            NIL => self.lru_head = index,
            t => self.nodes[t as usize].next = index,
        }
        self.lru_tail = index;
    }

    fn list_len(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.lru_head;
        while cursor != NIL {
            count += 1;
            cursor = self.nodes[cursor as usize].next;
        }
        count
    }
}

struct CacheInner {
    shards: Vec<Mutex<Shard>>,
    shard_capacity: usize,
    hasher: RandomState,
    loader: CacheLoader,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Hit/miss counters, snapshot at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// The sharded cache. Cheap to clone; all clones share the same shards.
#[derive(Clone)]
pub struct LruCache {
    inner: Arc<CacheInner>,
}

impl LruCache {
    /// `capacity` total entries across `concurrency` shards.
    ///
    /// Capacity is rounded up so each shard holds at least `concurrency`
    /// entries; a capacity below `concurrency²` is rejected outright.
    pub fn new(capacity: u32, concurrency: u32, loader: CacheLoader) -> Result<LruCache> {
        if concurrency == 0 {
            return Err(Error::InvalidCollectionConfig(
                "cache concurrency must be at least 1",
            ));
        }
        if capacity < concurrency * concurrency {
            return Err(Error::InvalidCollectionConfig(
                "cache capacity must be at least concurrency squared",
            ));
        }
        let shard_capacity = (capacity as usize).div_ceil(concurrency as usize);
        let shards = (0..concurrency).map(|_| Mutex::new(Shard::new())).collect();
        log::debug!(
            "cache: {concurrency} shards x {shard_capacity} entries ({capacity} requested)"
        );
        Ok(LruCache {
            inner: Arc::new(CacheInner {
                shards,
                shard_capacity,
                hasher: RandomState::new(),
                loader,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
        }
    }

    /// Fetches `key`, loading it on a miss. The returned pin keeps the entry
    /// out of eviction until dropped.
    pub fn get(&self, key: u32) -> Result<CachePin> {
        let hash = self.inner.hasher.hash_one(key) as i64;
        let shard_index = (hash.unsigned_abs() % self.inner.shards.len() as u64) as u32;
        let mut shard = self.inner.shards[shard_index as usize]
            .lock()
            .map_err(|_| Error::CollectionFailure("cache shard mutex poisoned".into()))?;

        if let Some(&index) = shard.tree.get(&(hash, key)) {
            let active = {
                let node = &mut shard.nodes[index as usize];
                node.active += 1;
                node.active
            };
            if active == 1 {
                shard.unlink(index);
            }
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            let data = shard.nodes[index as usize].data.clone();
            return Ok(CachePin {
                inner: self.inner.clone(),
                shard: shard_index,
                node: index,
                data,
            });
        }

        // Miss: take a fresh pool slot while below capacity, else the LRU
        // victim. Pinned nodes are off the list, so the tail is always safe
        // to reclaim; an empty list means everything is pinned.
        let index = if shard.nodes.len() < self.inner.shard_capacity {
            shard.nodes.push(Node {
                hash,
                key,
                data: Arc::from(Vec::new()),
                active: 0,
                prev: NIL,
                next: NIL,
            });
            (shard.nodes.len() - 1) as u32
        } else {
            let victim = shard.lru_tail;
            if victim == NIL {
                return Err(Error::InsufficientHandles);
            }
            debug_assert_eq!(shard.nodes[victim as usize].active, 0);
            shard.unlink(victim);
            let (old_hash, old_key) = {
                let node = &shard.nodes[victim as usize];
                (node.hash, node.key)
            };
            shard.tree.remove(&(old_hash, old_key));
            victim
        };

        let bytes = match (self.inner.loader)(key) {
            Ok(bytes) => bytes,
            Err(err) => {
                // Keep the node reclaimable as the immediate next victim.
                shard.push_tail(index);
                return Err(err);
            }
        };

        {
            let node = &mut shard.nodes[index as usize];
            node.hash = hash;
            node.key = key;
            node.data = Arc::from(bytes);
            node.active = 1;
        }
        shard.tree.insert((hash, key), index);
        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        let data = shard.nodes[index as usize].data.clone();
        Ok(CachePin {
            inner: self.inner.clone(),
            shard: shard_index,
            node: index,
            data,
        })
    }

    /// Checks the per-shard accounting invariant: every allocated node is
    /// either on the LRU list or pinned, never both.
    #[cfg(test)]
    fn check_invariants(&self) {
        for shard in &self.inner.shards {
            let shard = shard.lock().unwrap();
            let pinned = shard.nodes.iter().filter(|n| n.active > 0).count();
            assert_eq!(shard.list_len() + pinned, shard.nodes.len());
            for (_, &index) in shard.tree.iter() {
                assert!((index as usize) < shard.nodes.len());
            }
        }
    }
}

impl std::fmt::Debug for LruCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCache")
            .field("shards", &self.inner.shards.len())
            .field("shard_capacity", &self.inner.shard_capacity)
            .finish()
    }
}

/// A pinned cache entry. Holds the entry's bytes alive and the entry out of
/// the LRU list; dropping the pin makes the entry evictable again.
pub struct CachePin {
    inner: Arc<CacheInner>,
    shard: u32,
    node: u32,
    data: Arc<[u8]>,
}

impl std::fmt::Debug for CachePin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachePin")
            .field("shard", &self.shard)
            .field("node", &self.node)
            .field("len", &self.data.len())
            .finish()
    }
}

impl CachePin {
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for CachePin {
    fn drop(&mut self) {
        if let Ok(mut shard) = self.inner.shards[self.shard as usize].lock() {
            let active = {
                let node = &mut shard.nodes[self.node as usize];
                node.active = node.active.saturating_sub(1);
                node.active
            };
            if active == 0 {
                shard.push_head(self.node);
            }
        }
    }
}

impl std::ops::Deref for CachePin {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}
