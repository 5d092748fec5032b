//! Component records.

use binrw::prelude::*;

/// Maps one of a component's evidence headers to the graph that serves it.
///
/// `header_name_offset` points at the header's name in the strings
/// collection; `graph_index` selects an entry in the graphs collection.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyValuePair {
    pub header_name_offset: u32,
    pub graph_index: u32,
}

/// A component: a logical group of properties contributing one result per
/// lookup.
///
/// Variable-width: an 11-byte prefix followed by `pairs.len()` key/value
/// pairs of 8 bytes each.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRecord {
    pub id: u8,
    pub name_offset: u32,
    pub default_profile_offset: u32,
    #[bw(try_calc = u16::try_from(pairs.len()))]
    #[br(temp, assert(kv_count >= 1, "component must name at least one header"))]
    kv_count: u16,
    #[br(count = kv_count)]
    pub pairs: Vec<KeyValuePair>,
}

impl ComponentRecord {
    /// Size of the fixed prefix read before the pair count is known.
    pub const PREFIX_SIZE: u32 = 11;

    /// Full record size given the 11 prefix bytes.
    pub fn full_size(prefix: &[u8]) -> u32 {
        let kv_count = u32::from(u16::from_le_bytes([prefix[9], prefix[10]]));
        Self::PREFIX_SIZE + kv_count * 8
    }
}
