//! Strings collection entries.

use binrw::prelude::*;

/// One entry in the strings collection: an `i16` byte count followed by the
/// payload.
///
/// The payload interpretation is decided by the property that references the
/// entry: text (NUL-terminated), `i32`, `f32`, `i16`, raw IP bytes, WKB.
/// The entry itself is just sized bytes.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringsEntry {
    #[bw(try_calc = i16::try_from(data.len()))]
    #[br(temp, assert(size >= 1, "strings entry must not be empty"))]
    size: i16,
    #[br(count = size)]
    pub data: Vec<u8>,
}

impl StringsEntry {
    /// Size of the length prefix read before the payload size is known.
    pub const PREFIX_SIZE: u32 = 2;

    pub fn new(data: Vec<u8>) -> Self {
        StringsEntry { data }
    }

    /// Builds a text entry with the stored NUL terminator.
    pub fn text(s: &str) -> Self {
        let mut data = s.as_bytes().to_vec();
        data.push(0);
        StringsEntry { data }
    }

    /// Full record size given the two prefix bytes.
    pub fn full_size(prefix: [u8; 2]) -> u32 {
        Self::PREFIX_SIZE + u32::from(u16::from(prefix[0]) | (u16::from(prefix[1]) << 8))
    }
}
