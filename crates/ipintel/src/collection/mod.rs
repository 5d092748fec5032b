//! Read-only record collections over the data file.
//!
//! A collection serves fixed- or variable-width records out of one span of
//! the file, through one of four backends chosen at construction: a view
//! into the in-memory file image, per-request file reads, an LRU cache over
//! file reads, or a partial in-memory prefix chained to a secondary backend
//! for the tail.

mod item;
mod layout;

pub use item::Item;
pub use layout::{RecordLayout, layouts};

use std::sync::Arc;

use ipintel_fmt::CollectionHeader;

use crate::cache::LruCache;
use crate::config::{CollectionConfig, LOADED_ALL};
use crate::pool::FileHandlePool;
use crate::{Error, Result};

/// Where collection bytes come from.
#[derive(Clone)]
pub enum Backend {
    /// The whole file resident in memory.
    Memory(Arc<[u8]>),
    /// A pool of read handles on the source file.
    File {
        pool: Arc<FileHandlePool>,
        file_size: u64,
    },
}

impl Backend {
    fn total_size(&self) -> u64 {
        match self {
            Backend::Memory(data) => data.len() as u64,
            Backend::File { file_size, .. } => *file_size,
        }
    }
}

/// Reads complete records straight from the file; shared by the raw-file
/// and cached variants.
struct FileReader {
    pool: Arc<FileHandlePool>,
    header: CollectionHeader,
    layout: RecordLayout,
}

impl FileReader {
    fn read(&self, offset: u32) -> Result<Vec<u8>> {
        let mut handle = self.pool.get()?;
        let absolute = u64::from(self.header.start_position) + u64::from(offset);
        match self.layout {
            RecordLayout::Fixed { element_size } => {
                check_span(offset, element_size, self.header.length)?;
                let mut buf = vec![0u8; element_size as usize];
                handle.read_exact_at(absolute, &mut buf)?;
                Ok(buf)
            }
            RecordLayout::Variable {
                prefix_size,
                full_size,
            } => {
                check_span(offset, prefix_size, self.header.length)?;
                let mut buf = vec![0u8; prefix_size as usize];
                handle.read_exact_at(absolute, &mut buf)?;
                let full = full_size(&buf);
                if full < prefix_size {
                    return Err(Error::corrupt(format!(
                        "record at offset {offset} declares {full} bytes, less than its prefix"
                    )));
                }
                check_span(offset, full, self.header.length)?;
                buf.resize(full as usize, 0);
                handle.read_exact_at(
                    absolute + u64::from(prefix_size),
                    &mut buf[prefix_size as usize..],
                )?;
                Ok(buf)
            }
        }
    }
}

fn check_span(offset: u32, needed: u32, length: u32) -> Result<()> {
    if u64::from(offset) + u64::from(needed) > u64::from(length) {
        return Err(Error::CollectionOffsetOutOfRange { offset, length });
    }
    Ok(())
}

/// A view into a resident byte region holding `length` collection bytes.
struct MemoryRegion {
    data: Arc<[u8]>,
    /// Offset of the collection's byte 0 inside `data`.
    base: usize,
    length: u32,
    layout: RecordLayout,
}

impl MemoryRegion {
    fn get(&self, offset: u32) -> Result<Item> {
        let full = match self.layout {
            RecordLayout::Fixed { element_size } => {
                check_span(offset, element_size, self.length)?;
                element_size
            }
            RecordLayout::Variable {
                prefix_size,
                full_size,
            } => {
                check_span(offset, prefix_size, self.length)?;
                let start = self.base + offset as usize;
                let full = full_size(&self.data[start..start + prefix_size as usize]);
                check_span(offset, full, self.length)?;
                full
            }
        };
        let start = self.base + offset as usize;
        Ok(Item::Shared {
            data: self.data.clone(),
            range: start..start + full as usize,
        })
    }
}

enum Inner {
    Memory(MemoryRegion),
    File(FileReader),
    Cached { cache: LruCache },
    Partial {
        prefix: MemoryRegion,
        loaded_items: u32,
        loaded_bytes: u32,
        secondary: Box<Collection>,
    },
}

/// One sub-collection of the data set.
pub struct Collection {
    name: &'static str,
    header: CollectionHeader,
    layout: RecordLayout,
    inner: Inner,
}

impl Collection {
    /// Builds the variant selected by `cfg`, per the collection rules: fully
    /// resident when the file is in memory or everything is preloaded, a
    /// partial prefix when `loaded` is a positive count, an LRU cache when
    /// `capacity` is set, and raw per-request reads otherwise.
    pub fn new(
        name: &'static str,
        backend: &Backend,
        header: CollectionHeader,
        layout: RecordLayout,
        cfg: CollectionConfig,
    ) -> Result<Collection> {
        if !header.fits_within(backend.total_size()) {
            return Err(Error::corrupt(format!(
                "{name} collection span [{}, {}) exceeds the file",
                header.start_position,
                header.end_position()
            )));
        }
        if let RecordLayout::Fixed { element_size } = layout {
            if element_size > 1 && u64::from(header.count) * u64::from(element_size) != u64::from(header.length)
            {
                return Err(Error::corrupt(format!(
                    "{name} collection length {} does not match {} x {}",
                    header.length, header.count, element_size
                )));
            }
        }

        let inner = match backend {
            Backend::Memory(data) => Inner::Memory(MemoryRegion {
                data: data.clone(),
                base: header.start_position as usize,
                length: header.length,
                layout,
            }),
            Backend::File { pool, .. } => {
                let reader = FileReader {
                    pool: pool.clone(),
                    header,
                    layout,
                };
                if cfg.loaded == LOADED_ALL || cfg.loaded >= header.count {
                    let region = read_region(&reader)?;
                    log::debug!("{name}: fully loaded ({} bytes)", header.length);
                    Inner::Memory(MemoryRegion {
                        data: Arc::from(region),
                        base: 0,
                        length: header.length,
                        layout,
                    })
                } else if cfg.loaded > 0 {
                    let (bytes, loaded_items, loaded_bytes) =
                        read_prefix_items(&reader, cfg.loaded)?;
                    let secondary = Box::new(Collection::new(
                        name,
                        backend,
                        header,
                        layout,
                        CollectionConfig {
                            loaded: 0,
                            ..cfg
                        },
                    )?);
                    log::debug!(
                        "{name}: partial, {loaded_items} items ({loaded_bytes} bytes) resident"
                    );
                    Inner::Partial {
                        prefix: MemoryRegion {
                            data: Arc::from(bytes),
                            base: 0,
                            length: loaded_bytes,
                            layout,
                        },
                        loaded_items,
                        loaded_bytes,
                        secondary,
                    }
                } else if cfg.capacity > 0 {
                    let reader = Arc::new(reader);
                    let cache = LruCache::new(
                        cfg.capacity,
                        cfg.concurrency.max(1),
                        Box::new(move |offset| reader.read(offset)),
                    )?;
                    Inner::Cached { cache }
                } else {
                    Inner::File(reader)
                }
            }
        };

        Ok(Collection {
            name,
            header,
            layout,
            inner,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn count(&self) -> u32 {
        self.header.count
    }

    /// Record width in bytes; 0 for variable-width collections.
    pub fn element_size(&self) -> u32 {
        self.layout.element_size()
    }

    /// Total byte span of the collection.
    pub fn size(&self) -> u32 {
        self.header.length
    }

    /// Fetches a fixed-width record by index.
    pub fn get_by_index(&self, index: u32) -> Result<Item> {
        let RecordLayout::Fixed { element_size } = self.layout else {
            return Err(Error::CollectionFailure(format!(
                "{} is variable-width and cannot be indexed",
                self.name
            )));
        };
        if index >= self.header.count {
            return Err(Error::CollectionIndexOutOfRange {
                index,
                count: self.header.count,
            });
        }
        self.get_by_offset(index * element_size)
    }

    /// Fetches a record by byte offset relative to the collection start.
    pub fn get_by_offset(&self, offset: u32) -> Result<Item> {
        match &self.inner {
            Inner::Memory(region) => region.get(offset),
            Inner::File(reader) => reader.read(offset).map(Item::Owned),
            Inner::Cached { cache } => {
                check_span(offset, 1, self.header.length)?;
                cache.get(offset).map(Item::Cached)
            }
            Inner::Partial {
                prefix,
                loaded_bytes,
                secondary,
                ..
            } => {
                if offset < *loaded_bytes {
                    prefix.get(offset)
                } else {
                    secondary.get_by_offset(offset)
                }
            }
        }
    }

    /// Reads `count` raw bytes starting at `offset`; for byte-stream
    /// collections (span bytes, bit-packed nodes).
    pub fn get_bytes(&self, offset: u32, count: u32) -> Result<Item> {
        check_span(offset, count, self.header.length)?;
        match &self.inner {
            Inner::Memory(region) => {
                let start = region.base + offset as usize;
                Ok(Item::Shared {
                    data: region.data.clone(),
                    range: start..start + count as usize,
                })
            }
            Inner::File(reader) => {
                let mut handle = reader.pool.get()?;
                let absolute = u64::from(reader.header.start_position) + u64::from(offset);
                let mut buf = vec![0u8; count as usize];
                handle.read_exact_at(absolute, &mut buf)?;
                Ok(Item::Owned(buf))
            }
            Inner::Cached { .. } => Err(Error::CollectionFailure(format!(
                "{} is cached and cannot serve raw byte ranges",
                self.name
            ))),
            Inner::Partial {
                prefix,
                loaded_bytes,
                secondary,
                ..
            } => {
                if offset + count <= *loaded_bytes {
                    let start = prefix.base + offset as usize;
                    Ok(Item::Shared {
                        data: prefix.data.clone(),
                        range: start..start + count as usize,
                    })
                } else {
                    secondary.get_bytes(offset, count)
                }
            }
        }
    }

    /// Hit/miss counters when this collection runs behind a cache.
    pub fn cache_stats(&self) -> Option<crate::cache::CacheStats> {
        match &self.inner {
            Inner::Cached { cache } => Some(cache.stats()),
            _ => None,
        }
    }

    /// Binary search over a fixed-width sorted collection.
    ///
    /// The comparator sees each probed item and its index and orders the
    /// probe against the target; every probed item is released before the
    /// next probe.
    pub fn binary_search_by<F>(&self, mut compare: F) -> Result<Option<u32>>
    where
        F: FnMut(&Item, u32) -> Result<std::cmp::Ordering>,
    {
        use std::cmp::Ordering;

        let mut lower: i64 = 0;
        let mut upper: i64 = i64::from(self.header.count) - 1;
        while lower <= upper {
            let middle = ((lower + upper) / 2) as u32;
            let item = self.get_by_index(middle)?;
            match compare(&item, middle)? {
                Ordering::Equal => return Ok(Some(middle)),
                Ordering::Less => lower = i64::from(middle) + 1,
                Ordering::Greater => upper = i64::from(middle) - 1,
            }
        }
        Ok(None)
    }

    /// Walks every record in file order.
    pub fn for_each<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(u32, &Item) -> Result<()>,
    {
        let mut offset = 0u32;
        while offset < self.header.length {
            let item = self.get_by_offset(offset)?;
            visit(offset, &item)?;
            offset += item.len() as u32;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match &self.inner {
            Inner::Memory(_) => "memory",
            Inner::File(_) => "file",
            Inner::Cached { .. } => "cached",
            Inner::Partial { .. } => "partial",
        };
        write!(
            f,
            "Collection({}, {variant}, {} items, {} bytes)",
            self.name, self.header.count, self.header.length
        )
    }
}

/// Reads the entire collection span into an owned buffer.
fn read_region(reader: &FileReader) -> Result<Vec<u8>> {
    let mut handle = reader.pool.get()?;
    let mut buf = vec![0u8; reader.header.length as usize];
    handle.read_exact_at(u64::from(reader.header.start_position), &mut buf)?;
    Ok(buf)
}

/// Reads the first `loaded` whole items; returns their bytes, the item
/// count actually read, and the byte length.
fn read_prefix_items(reader: &FileReader, loaded: u32) -> Result<(Vec<u8>, u32, u32)> {
    let items = loaded.min(reader.header.count);
    match reader.layout {
        RecordLayout::Fixed { element_size } => {
            let bytes = items * element_size;
            let mut handle = reader.pool.get()?;
            let mut buf = vec![0u8; bytes as usize];
            handle.read_exact_at(u64::from(reader.header.start_position), &mut buf)?;
            Ok((buf, items, bytes))
        }
        RecordLayout::Variable { .. } => {
            let mut buf = Vec::new();
            let mut offset = 0u32;
            let mut read = 0u32;
            while read < items && offset < reader.header.length {
                let record = reader.read(offset)?;
                offset += record.len() as u32;
                buf.extend_from_slice(&record);
                read += 1;
            }
            Ok((buf, read, offset))
        }
    }
}
