//! Sub-collection placement header.

use binrw::prelude::*;

/// Describes where one sub-collection lives inside the data file.
///
/// `start_position` is an absolute file offset. For fixed-width collections
/// `length == count × element_size`; for variable-width collections `count`
/// is the number of items and `length` the total byte span.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionHeader {
    pub start_position: u32,
    pub length: u32,
    pub count: u32,
}

impl CollectionHeader {
    pub const SIZE: u32 = 12;

    /// Whether the described span fits inside a file of `file_size` bytes.
    pub fn fits_within(&self, file_size: u64) -> bool {
        let start = u64::from(self.start_position);
        let length = u64::from(self.length);
        start <= file_size && length <= file_size - start
    }

    /// End of the collection span as an absolute file offset.
    pub fn end_position(&self) -> u64 {
        u64::from(self.start_position) + u64::from(self.length)
    }
}
