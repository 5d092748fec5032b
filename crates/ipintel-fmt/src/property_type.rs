//! Property type records.

use binrw::prelude::*;

/// Binds a property name to the stored representation of its values.
///
/// Records are ordered ascending by `name_offset` so the stored type of a
/// property can be found by binary search on its name offset.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyTypeRecord {
    pub name_offset: u32,
    pub stored_type: u8,
}

impl PropertyTypeRecord {
    pub const ELEMENT_SIZE: u32 = 5;
}
