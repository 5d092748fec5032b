//! Value records.

use binrw::prelude::*;

/// One distinct value a property can take.
///
/// `name_offset` points at the strings entry holding the value itself, in
/// the stored representation the owning property declares.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRecord {
    pub property_index: u16,
    pub name_offset: u32,
    pub description_offset: u32,
    pub url_offset: u32,
}

impl ValueRecord {
    pub const ELEMENT_SIZE: u32 = 14;
}
